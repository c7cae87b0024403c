// ===============================
// src/server.rs (ledger REST API, hyper 0.14)
// ===============================
//
// Routes (optional `/api` prefix):
//   GET    /aggregate/{YYYY-MM}
//   GET    /{items-cost|expenses|sales}[?period=YYYY-MM]
//   POST   /{items-cost|expenses|sales|loans|reports}
//   GET    /{loans|reports}
//   DELETE /{resource}/{id}                 -> 204 / 404
//   GET    /metrics                          (no session gate)
//
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::{LedgerCategory, NewLoan, NewMonthlyReport, NewRecord, PeriodKey};
use crate::error::StoreError;
use crate::gate::{SessionGate, OPERATOR_HEADER, TOKEN_HEADER};
use crate::memory_store::MemoryLedger;
use crate::metrics;
use crate::store::{AggregateQuery, RecordStore, LOANS, REPORTS};

pub struct ServerState {
    pub store: Arc<MemoryLedger>,
    pub gate: SessionGate,
    /// Period used when a list request carries no `?period=`.
    pub default_period: PeriodKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Entries(LedgerCategory),
    Loans,
    Reports,
}

impl Resource {
    fn parse(seg: &str) -> Option<Self> {
        match seg {
            LOANS => Some(Resource::Loans),
            REPORTS => Some(Resource::Reports),
            other => LedgerCategory::from_slug(other).map(Resource::Entries),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Resource::Entries(c) => c.slug(),
            Resource::Loans => LOANS,
            Resource::Reports => REPORTS,
        }
    }
}

type HttpResult = Result<Response<Body>, Response<Body>>;

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(e) => {
            error!(?e, "response encode failed");
            let mut rsp = Response::new(Body::empty());
            *rsp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            rsp
        }
    }
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response<Body> {
    json_response(status, &json!({ "error": message.to_string() }))
}

fn no_content() -> Response<Body> {
    let mut rsp = Response::new(Body::empty());
    *rsp.status_mut() = StatusCode::NO_CONTENT;
    rsp
}

fn store_error(e: StoreError) -> Response<Body> {
    match e {
        StoreError::NotFound { .. } => error_response(StatusCode::NOT_FOUND, e),
        StoreError::Invalid(_) => error_response(StatusCode::BAD_REQUEST, e),
        StoreError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, e),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

async fn read_body<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
    serde_json::from_slice(&bytes).map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

fn header<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn period_param(req: &Request<Body>, default: PeriodKey) -> Result<PeriodKey, Response<Body>> {
    let query = req.uri().query().unwrap_or_default();
    match url::form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == "period") {
        Some((_, v)) => v.parse().map_err(|e| error_response(StatusCode::BAD_REQUEST, e)),
        None => Ok(default),
    }
}

/// Ids arrive percent-encoded, one path segment each.
fn path_id(raw: &str) -> Result<String, Response<Body>> {
    urlencoding::decode(raw)
        .map(|id| id.into_owned())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

async fn route(state: Arc<ServerState>, req: Request<Body>) -> (&'static str, HttpResult) {
    let path = req.uri().path().to_string();
    let mut segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segs.first() == Some(&"api") {
        segs.remove(0);
    }
    let method = req.method().clone();

    if method == Method::GET && segs == ["metrics"] {
        return ("metrics", Ok(metrics::metrics_response()));
    }

    if !state.gate.is_authenticated(header(&req, OPERATOR_HEADER), header(&req, TOKEN_HEADER)) {
        return ("gate", Err(error_response(StatusCode::UNAUTHORIZED, StoreError::Unauthorized)));
    }

    let store = &state.store;
    match (method, segs.as_slice()) {
        (Method::GET, ["aggregate", key]) => {
            let res = match key.parse::<PeriodKey>() {
                Ok(period) => match store.compute_snapshot(period).await {
                    Ok(s) => Ok(json_response(StatusCode::OK, &s)),
                    Err(e) => Err(store_error(e)),
                },
                Err(e) => Err(error_response(StatusCode::BAD_REQUEST, e)),
            };
            ("aggregate", res)
        }
        (m, [seg]) => {
            let Some(resource) = Resource::parse(seg) else {
                return ("unknown", Err(error_response(StatusCode::NOT_FOUND, "no such route")));
            };
            (resource.label(), collection(&state, resource, m, req).await)
        }
        (Method::DELETE, [seg, raw_id]) => {
            let Some(resource) = Resource::parse(seg) else {
                return ("unknown", Err(error_response(StatusCode::NOT_FOUND, "no such route")));
            };
            let id = match path_id(raw_id) {
                Ok(id) => id,
                Err(rsp) => return (resource.label(), Err(rsp)),
            };
            let res = match resource {
                Resource::Entries(c) => store.delete_entry(c, &id).await,
                Resource::Loans => store.delete_loan(&id).await,
                Resource::Reports => store.delete_report(&id).await,
            };
            (resource.label(), res.map(|_| no_content()).map_err(store_error))
        }
        _ => ("unknown", Err(error_response(StatusCode::NOT_FOUND, "no such route"))),
    }
}

async fn collection(state: &ServerState, resource: Resource, method: Method, req: Request<Body>) -> HttpResult {
    let store = &state.store;
    match (method, resource) {
        (Method::GET, Resource::Entries(c)) => {
            let period = period_param(&req, state.default_period)?;
            let rows = store.list_entries(c, period).await.map_err(store_error)?;
            Ok(json_response(StatusCode::OK, &rows))
        }
        (Method::POST, Resource::Entries(c)) => {
            let form: NewRecord = read_body(req).await?;
            let row = store.create_entry(c, &form).await.map_err(store_error)?;
            Ok(json_response(StatusCode::CREATED, &row))
        }
        (Method::GET, Resource::Loans) => {
            let rows = store.list_loans().await.map_err(store_error)?;
            Ok(json_response(StatusCode::OK, &rows))
        }
        (Method::POST, Resource::Loans) => {
            let form: NewLoan = read_body(req).await?;
            let row = store.create_loan(&form).await.map_err(store_error)?;
            Ok(json_response(StatusCode::CREATED, &row))
        }
        (Method::GET, Resource::Reports) => {
            let rows = store.list_reports().await.map_err(store_error)?;
            Ok(json_response(StatusCode::OK, &rows))
        }
        (Method::POST, Resource::Reports) => {
            let form: NewMonthlyReport = read_body(req).await?;
            let row = store.create_report(&form).await.map_err(store_error)?;
            Ok(json_response(StatusCode::CREATED, &row))
        }
        _ => Err(error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")),
    }
}

async fn handle(state: Arc<ServerState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let (route_label, res) = route(state, req).await;
    let rsp = res.unwrap_or_else(|e| e);
    let status = rsp.status();
    metrics::HTTP_REQUESTS
        .with_label_values(&[route_label, status.as_str()])
        .inc();
    debug!(%method, %path, status = status.as_u16(), "request");
    Ok(rsp)
}

/// Binds `addr` (port 0 picks one) and returns the bound address with the
/// server future; the caller drives it until `shutdown` resolves.
pub fn bind<F>(
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: F,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });
    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local = server.local_addr();
    info!(addr = %local, "ledger API listening");
    Ok((local, server.with_graceful_shutdown(shutdown)))
}

pub async fn serve(addr: SocketAddr, state: Arc<ServerState>) -> Result<(), hyper::Error> {
    let (_, server) = bind(addr, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    })?;
    server.await
}
