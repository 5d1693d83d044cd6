#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Stakeforge node entrypoint (systemd-friendly).
//! Loads the ledger and rounds, then serves the admission-gated HTTP surface.

use anyhow::{bail, Context, Result};
use stakeforge::core::config::{GenesisWallet, NodeConfig};
use stakeforge::core::consensus::rounds::{RoundError, RoundManager};
use stakeforge::core::state::persistent_state::ChainStore;
use stakeforge::core::state::wallet_ledger::WalletLedger;
use stakeforge::core::types::{Address, PublicKey};
use stakeforge::monitoring::{logging::init_logging, metrics::Metrics};
use stakeforge::networking::admission::PeerAdmissionGate;
use stakeforge::networking::http::{router, AppState};
use stakeforge::networking::p2p::P2pMonitor;
use stakeforge::networking::peer_registry::PeerRegistry;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STAKEFORGE_CONFIG").ok())
        .unwrap_or_else(|| "config/node.toml".to_string())
}

fn genesis_address(w: &GenesisWallet, version: u8) -> Result<(Address, Option<PublicKey>)> {
    match (&w.public_key, &w.address) {
        (Some(pk), _) => {
            let pk = PublicKey::parse(pk).with_context(|| format!("genesis public key {pk}"))?;
            Ok((Address::from_public_key(&pk, version), Some(pk)))
        }
        (None, Some(a)) => Ok((Address::new(a.clone()), None)),
        (None, None) => bail!("genesis wallet without address or public key"),
    }
}

/// Apply genesis accounts: keys, delegates and balances first, votes last.
fn apply_genesis(ledger: &WalletLedger, wallets: &[GenesisWallet]) -> Result<()> {
    let version = ledger.address_version();
    let mut votes = Vec::new();
    for w in wallets {
        let (address, pk) = genesis_address(w, version)?;
        ledger.get_or_create(&address)?;
        if let Some(pk) = pk {
            ledger.set_public_key(&address, pk)?;
        }
        if let Some(name) = w.username.as_deref() {
            ledger.register_delegate(&address, name)?;
        }
        if w.balance > 0 {
            ledger.apply_balance_delta(&address, w.balance as i128)?;
        }
        if let Some(v) = w.vote.as_deref() {
            let target = PublicKey::parse(v).with_context(|| format!("genesis vote {v}"))?;
            votes.push((address, target));
        }
    }
    for (address, target) in votes {
        ledger.set_vote(&address, Some(target))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = NodeConfig::load(config_path()).context("load config")?;
    init_logging(cfg.node.log_format, &cfg.node.log_level);

    info!(
        name = %cfg.node.name,
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "stakeforge node starting"
    );

    let metrics = Arc::new(Metrics::new().context("metrics init")?);

    std::fs::create_dir_all(&cfg.node.data_dir).context("create data dir")?;
    let db_path = Path::new(&cfg.node.data_dir).join("chain");
    let store = ChainStore::open(&db_path.to_string_lossy()).context("open chain store")?;

    let persisted = store.load_all_wallets().context("load wallets")?;
    let fresh = persisted.is_empty();
    let ledger = Arc::new(
        WalletLedger::from_wallets(persisted, cfg.consensus.address_version)
            .context("rebuild wallet ledger")?,
    );
    if fresh && !cfg.genesis.wallets.is_empty() {
        apply_genesis(&ledger, &cfg.genesis.wallets).context("apply genesis")?;
        store
            .save_wallets(&ledger.all_wallets()?)
            .context("persist genesis wallets")?;
        info!(wallets = cfg.genesis.wallets.len(), "genesis applied");
    }

    let rounds = Arc::new(RoundManager::new(
        ledger.clone(),
        store.clone(),
        cfg.consensus.delegate_count,
        metrics.clone(),
    ));
    match rounds.ensure_first_round() {
        Ok(r) => info!(round = r.round, "first round available"),
        Err(e @ RoundError::InsufficientDelegates { .. }) => {
            warn!(error = %e, "no forging order yet");
        }
        Err(e) => return Err(e).context("build first round"),
    }

    let registry = Arc::new(PeerRegistry::new(cfg.p2p.max_peers));
    let (monitor, mut peer_events) = P2pMonitor::new(
        cfg.p2p.local_node(),
        registry.clone(),
        metrics.clone(),
        cfg.p2p.event_buffer,
    );
    let gate = Arc::new(
        PeerAdmissionGate::new(monitor, cfg.p2p.local_node(), metrics.clone())
            .with_trust_forwarded_for(cfg.p2p.trust_forwarded_for),
    );

    let ev_task = tokio::spawn(async move {
        while let Some(ev) = peer_events.recv().await {
            info!(?ev, "peer event");
        }
    });

    let mut round_rx = rounds.subscribe();
    let round_task = tokio::spawn(async move {
        loop {
            match round_rx.recv().await {
                Ok(r) => info!(round = r.round, first = ?r.public_keys.first(), "round announced"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "round announcements lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = router(AppState {
        gate,
        ledger: ledger.clone(),
        rounds,
        registry,
        metrics,
    });

    let addr: SocketAddr = cfg.http.listen_addr.parse().context("http.listen_addr")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("bind http")?;
    info!(%addr, "http listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    store
        .save_wallets(&ledger.all_wallets()?)
        .context("persist wallets on shutdown")?;
    ev_task.abort();
    round_task.abort();
    info!("stakeforge node stopped");
    Ok(())
}
