use std::error::Error;

use vergen::{BuildBuilder, CargoBuilder, Emitter};
use vergen_git2::Git2Builder;

// Emits VERGEN_* variables read by the node's startup banner.
fn main() -> Result<(), Box<dyn Error>> {
    let mut emitter = Emitter::default();
    emitter
        .add_instructions(&BuildBuilder::all_build()?)?
        .add_instructions(&CargoBuilder::all_cargo()?)?
        .add_instructions(&Git2Builder::all_git()?)?;
    emitter.emit()?;
    Ok(())
}
