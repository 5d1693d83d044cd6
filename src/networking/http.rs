// Copyright (c) 2026 Stakeforge
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! HTTP surface: the admission gate as axum middleware in front of a few peer and
//! operator endpoints.
//!
//! The router must be served with `into_make_service_with_connect_info::<SocketAddr>()`
//! so the gate sees the socket address.

use crate::core::consensus::ranking::rank_delegates;
use crate::core::consensus::rounds::{RoundError, RoundManager};
use crate::core::state::persistent_state::ChainStore;
use crate::core::state::wallet_ledger::WalletLedger;
use crate::core::types::{Peer, Round};
use crate::monitoring::metrics::Metrics;
use crate::networking::admission::{Admission, Headers, InboundRequest, PeerAdmissionGate};
use crate::networking::p2p::P2pMonitor;
use crate::networking::peer_registry::PeerRegistry;
use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Admission pipeline.
    pub gate: Arc<PeerAdmissionGate<P2pMonitor>>,
    /// Wallet ledger.
    pub ledger: Arc<WalletLedger>,
    /// Round manager.
    pub rounds: Arc<RoundManager<ChainStore>>,
    /// Accepted peers.
    pub registry: Arc<PeerRegistry>,
    /// Metrics.
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct PeerListBody {
    success: bool,
    peers: Vec<Peer>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    round: i64,
    delegate_count: u64,
    wallets: usize,
    peers: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DelegateView {
    rank: u32,
    username: String,
    public_key: String,
    vote_balance: u64,
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            code: "ResourceNotFound",
            message,
        }),
    )
        .into_response()
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            code: "InternalError",
            message,
        }),
    )
        .into_response()
}

/// Convert axum headers; values that are not visible ASCII are skipped.
pub fn to_gate_headers(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            out.insert(name.as_str(), v);
        }
    }
    out
}

async fn admission_layer(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let inbound = InboundRequest::new(req.uri().path(), addr.ip(), to_gate_headers(req.headers()));
    match state.gate.handle(&inbound) {
        Admission::Rejected(r) => {
            let status = StatusCode::from_u16(r.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(r.body)).into_response()
        }
        Admission::Continue { response_headers } => {
            let mut resp = next.run(req).await;
            for (k, v) in response_headers.iter() {
                match (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
                    (Ok(name), Ok(value)) => {
                        resp.headers_mut().insert(name, value);
                    }
                    _ => warn!(header = k, "unencodable response header skipped"),
                }
            }
            resp
        }
    }
}

async fn peer_handshake() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn peer_list(State(state): State<AppState>) -> Response {
    match state.registry.snapshot() {
        Ok(peers) => Json(PeerListBody {
            success: true,
            peers: peers.into_values().collect(),
        })
        .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn internal_status(State(state): State<AppState>) -> Response {
    let wallets = match state.ledger.len() {
        Ok(n) => n,
        Err(e) => return internal_error(e.to_string()),
    };
    let peers = match state.registry.len() {
        Ok(n) => n,
        Err(e) => return internal_error(e.to_string()),
    };
    Json(StatusBody {
        round: state.metrics.current_round.get(),
        delegate_count: state.rounds.delegate_count(),
        wallets,
        peers,
    })
    .into_response()
}

async fn internal_round(State(state): State<AppState>, Path(number): Path<u64>) -> Response {
    match state.rounds.get_round(number) {
        Ok(round) => Json::<Round>(round).into_response(),
        Err(RoundError::NotFound) => not_found(format!("round {number} does not exist")),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn internal_delegates(State(state): State<AppState>) -> Response {
    let snapshot = match state.ledger.all_delegates_snapshot() {
        Ok(s) => s,
        Err(e) => return internal_error(e.to_string()),
    };
    let by_key: std::collections::HashMap<_, _> = snapshot
        .entries()
        .iter()
        .map(|e| (e.public_key.clone(), e.username.clone()))
        .collect();
    let views: Vec<DelegateView> = rank_delegates(&snapshot)
        .into_iter()
        .map(|r| DelegateView {
            rank: r.rank,
            username: by_key.get(&r.public_key).cloned().unwrap_or_default(),
            public_key: r.public_key.to_string(),
            vote_balance: r.vote_balance,
        })
        .collect();
    Json(views).into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn fallback(req: Request) -> Response {
    not_found(format!("{} does not exist", req.uri().path()))
}

/// Build the router with the admission gate applied to every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/peer/handshake", get(peer_handshake))
        .route("/peer/list", get(peer_list))
        .route("/internal/status", get(internal_status))
        .route("/internal/rounds/:round", get(internal_round))
        .route("/internal/delegates", get(internal_delegates))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), admission_layer))
        .with_state(state)
}
