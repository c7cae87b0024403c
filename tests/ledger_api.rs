// End-to-end: dashboard session over HTTP against the in-memory ledger API.
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tokio::time::Duration;

use shop_ledger::domain::{LoanKind, NewLoan, NewRecord};
use shop_ledger::gate::{issue_token, OperatorCredentials, SessionGate};
use shop_ledger::http_store::HttpLedger;
use shop_ledger::memory_store::MemoryLedger;
use shop_ledger::server::{self, ServerState};
use shop_ledger::{Dashboard, Freshness, LedgerError, PeriodKey, RetryPolicy};

const SECRET: &str = "s3cret";

struct Running {
    addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

fn period() -> PeriodKey {
    PeriodKey::new(2026, 10).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

fn start(gate: SessionGate) -> Running {
    let state = Arc::new(ServerState {
        store: Arc::new(MemoryLedger::new()),
        gate,
        default_period: period(),
    });
    let (tx, rx) = oneshot::channel::<()>();
    let (addr, server) = server::bind("127.0.0.1:0".parse().unwrap(), state, async {
        let _ = rx.await;
    })
    .unwrap();
    tokio::spawn(server);
    Running { addr, _stop: tx }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_backoff: Duration::from_millis(10),
        request_timeout: Duration::from_secs(2),
    }
}

fn operator() -> OperatorCredentials {
    OperatorCredentials { operator: "rina".into(), token: issue_token(SECRET, "rina") }
}

async fn open(server: &Running, creds: Option<OperatorCredentials>) -> Dashboard {
    let base = format!("http://{}/api", server.addr);
    let ledger = Arc::new(HttpLedger::new(&base, Duration::from_secs(2), creds).unwrap());
    Dashboard::open(ledger.clone(), ledger, period(), policy()).await
}

#[tokio::test]
async fn session_reconciles_against_the_api() {
    let server = start(SessionGate::with_secret(SECRET));
    let dash = open(&server, Some(operator())).await;
    assert_eq!(dash.view().freshness, Freshness::Fresh);

    dash.inventory.create(NewRecord::new("stock", 5_000, day(1))).await.unwrap();
    let sale = dash.sales.create(NewRecord::new("phone", 10_000, day(3))).await.unwrap();
    assert!(sale.reconciliation.is_confirmed());
    let bill = dash.expenses.create(NewRecord::new("rent", 1_000, day(5))).await.unwrap();

    let s = dash.snapshot();
    assert_eq!(s.gross_sales, 5_000);
    assert_eq!(s.inventory_cost, -5_000);
    assert_eq!(s.shop_expense, 1_000);
    assert_eq!(s.available_profit, 9_000);

    dash.expenses.delete(&bill.record.id).await.unwrap();
    let s = dash.snapshot();
    assert_eq!(s.shop_expense, 0);
    assert_eq!(s.available_profit, 10_000);
    assert_eq!(dash.view().freshness, Freshness::Fresh);

    let again = dash.expenses.delete(&bill.record.id).await;
    assert!(matches!(again, Err(LedgerError::NotFound { .. })));
    assert_eq!(dash.snapshot().available_profit, 10_000);
    dash.teardown();
}

#[tokio::test]
async fn other_periods_stay_out_of_the_totals() {
    let server = start(SessionGate::open());
    let dash = open(&server, None).await;
    let sept = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
    dash.sales.create(NewRecord::new("old sale", 700, sept)).await.unwrap();

    assert_eq!(dash.snapshot().gross_sales, 0);
    assert!(dash.sales.records().await.is_empty());
}

#[tokio::test]
async fn loans_and_reports_round_trip() {
    let server = start(SessionGate::open());
    let dash = open(&server, None).await;
    dash.sales.create(NewRecord::new("phone", 2_000, day(2))).await.unwrap();
    dash.inventory.create(NewRecord::new("stock", 500, day(2))).await.unwrap();

    let loan = dash
        .loans
        .create(NewLoan { name: "budi".into(), amount: 300, reason: None, issue_date: day(4), kind: LoanKind::Taken })
        .await
        .unwrap();
    assert_eq!(dash.loans.amount_due(LoanKind::Taken).await, 300);
    assert_eq!(dash.snapshot().gross_sales, 1_500);

    let report = dash.reports.close_month("October 2026").await.unwrap();
    assert_eq!(report.total_sale, 1_500);
    assert_eq!(report.items_cost_price, -500);
    assert_eq!(report.items_purchased_price, 500);

    let fresh = open(&server, None).await;
    assert_eq!(fresh.reports.records().await.len(), 1);
    assert_eq!(fresh.loans.records(LoanKind::Taken).await[0].id, loan.id);
    assert_eq!(fresh.snapshot(), dash.snapshot());
}

#[tokio::test]
async fn gate_rejects_missing_or_forged_tokens() {
    let server = start(SessionGate::with_secret(SECRET));
    let http = reqwest::Client::new();
    let url = format!("http://{}/api/sales", server.addr);

    let bare = http.get(&url).send().await.unwrap();
    assert_eq!(bare.status(), reqwest::StatusCode::UNAUTHORIZED);

    let forged = http
        .get(&url)
        .header("x-shop-operator", "rina")
        .header("x-shop-token", issue_token("wrong", "rina"))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), reqwest::StatusCode::UNAUTHORIZED);

    let metrics = http.get(format!("http://{}/metrics", server.addr)).send().await.unwrap();
    assert_eq!(metrics.status(), reqwest::StatusCode::OK);

    let dash = open(&server, None).await;
    assert_eq!(dash.view().freshness, Freshness::Stale);
    let res = dash.sales.create(NewRecord::new("phone", 100, day(1))).await;
    assert!(matches!(res, Err(LedgerError::StoreWrite { .. })));
    dash.teardown();
}

#[tokio::test]
async fn bad_requests_get_json_errors() {
    let server = start(SessionGate::open());
    let http = reqwest::Client::new();

    let rsp = http
        .post(format!("http://{}/api/sales", server.addr))
        .json(&serde_json::json!({ "name": "", "amount": 10, "date": "2026-10-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = rsp.json().await.unwrap();
    assert!(body["error"].is_string());

    let rsp = http.get(format!("http://{}/api/aggregate/2026-13", server.addr)).send().await.unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::BAD_REQUEST);

    let rsp = http.delete(format!("http://{}/api/loans/nope", server.addr)).send().await.unwrap();
    assert_eq!(rsp.status(), reqwest::StatusCode::NOT_FOUND);
}
