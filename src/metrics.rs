// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use crate::state::{AggregationView, Freshness};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Reconciliation --------
pub static MUTATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ledger_mutations_total", "optimistic deltas applied (labels: category, op)"),
        &["category", "op"],
    )
    .unwrap()
});

pub static REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "aggregate_refreshes_total",
            "authoritative refreshes by outcome (applied, discarded, failed, retried)",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static SNAPSHOT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("aggregate_value", "current aggregate per field"), &["field"]).unwrap()
});

pub static STALE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("aggregate_stale", "1 if the last refresh failed").unwrap());

pub static UNCONFIRMED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("aggregate_unconfirmed_deltas", "optimistic deltas not yet covered by a refresh").unwrap());

pub static APPLIED_SEQ: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("aggregate_applied_seq", "sequence number of the applied refresh").unwrap());

// -------- Ledger API --------
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ledger_http_requests_total", "ledger API requests (labels: route, status)"),
        &["route", "status"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double registration is harmless
    for m in [
        REGISTRY.register(Box::new(MUTATIONS.clone())),
        REGISTRY.register(Box::new(REFRESHES.clone())),
        REGISTRY.register(Box::new(SNAPSHOT.clone())),
        REGISTRY.register(Box::new(STALE.clone())),
        REGISTRY.register(Box::new(APPLIED_SEQ.clone())),
        REGISTRY.register(Box::new(UNCONFIRMED.clone())),
        REGISTRY.register(Box::new(HTTP_REQUESTS.clone())),
    ] {
        let _ = m;
    }
}

/// Mirrors the session state into the gauges.
pub fn observe(view: &AggregationView) {
    let s = &view.snapshot;
    SNAPSHOT.with_label_values(&["gross_sales"]).set(s.gross_sales);
    SNAPSHOT.with_label_values(&["inventory_cost"]).set(s.inventory_cost);
    SNAPSHOT.with_label_values(&["shop_expense"]).set(s.shop_expense);
    SNAPSHOT.with_label_values(&["available_profit"]).set(s.available_profit);
    STALE.set(i64::from(view.freshness == Freshness::Stale));
    APPLIED_SEQ.set(view.applied_seq as i64);
    UNCONFIRMED.set(view.unconfirmed() as i64);
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// `GET /metrics` body with the Prometheus text content type.
pub fn metrics_response() -> Response<Body> {
    Response::builder()
        .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
        .body(Body::from(encode_metrics()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn exporter(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::GET && matches!(req.uri().path(), "/" | "/metrics") {
        return Ok(metrics_response());
    }
    let mut rsp = Response::new(Body::empty());
    *rsp.status_mut() = StatusCode::NOT_FOUND;
    Ok(rsp)
}

/// Exporter for client sessions (the `serve` API has its own `/metrics`).
/// Spawned on the current runtime; returns the bound address.
pub fn serve_metrics(addr: SocketAddr) -> Result<SocketAddr, hyper::Error> {
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(exporter)) });
    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local = server.local_addr();
    tracing::info!(addr = %local, "metrics listening (/metrics)");
    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::warn!(?e, "metrics exporter stopped");
        }
    });
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AggregationSnapshot;
    use crate::state::AggregationState;

    #[test]
    fn observe_exports_the_four_fields() {
        init();
        let state = AggregationState::new(AggregationSnapshot {
            gross_sales: 1,
            inventory_cost: -2,
            shop_expense: 3,
            available_profit: 4,
        });
        observe(&state.view());
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("aggregate_value{field=\"shop_expense\"}"));
        assert!(text.contains("aggregate_stale"));
        assert!(text.contains("aggregate_unconfirmed_deltas"));
    }

    #[tokio::test]
    async fn exporter_serves_metrics_and_nothing_else() {
        init();
        let addr = serve_metrics("127.0.0.1:0".parse().unwrap()).unwrap();
        let http = reqwest::Client::new();

        let rsp = http.get(format!("http://{addr}/metrics")).send().await.unwrap();
        assert_eq!(rsp.status(), reqwest::StatusCode::OK);
        assert!(rsp.text().await.unwrap().contains("aggregate_stale"));

        let rsp = http.get(format!("http://{addr}/orders")).send().await.unwrap();
        assert_eq!(rsp.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
