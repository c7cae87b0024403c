// ===============================
// src/main.rs
// ===============================
/*
 # jalankan ledger API lokal
 SESSION_SECRET=s3cret cargo run -- serve

 # token operator untuk header x-shop-token
 SESSION_SECRET=s3cret cargo run -- token rina

 # catat penjualan lalu lihat total bulan ini
 SHOP_OPERATOR=rina SESSION_SECRET=s3cret cargo run -- add sales --name phone --amount 1000 --date 2026-10-12
 SHOP_OPERATOR=rina SESSION_SECRET=s3cret cargo run -- summary

 curl -s localhost:5000/metrics | grep '^ledger_http_requests_total'
*/
/*
=============================================================================
Project : shop_ledger — retail shop bookkeeping with live aggregate totals
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Records inventory cost, expenses, sales, loans and monthly reports,
          keeps the month's aggregate totals consistent with optimistic
          deltas reconciled against the ledger API, exposes Prometheus
          metrics, and serves a reference ledger API.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shop_ledger::config::{self, Args};
use shop_ledger::dashboard::{Dashboard, Summary};
use shop_ledger::domain::{parse_date, LedgerCategory, LoanKind, Money, NewLoan, NewRecord, PeriodKey};
use shop_ledger::engine::Reconciliation;
use shop_ledger::gate::issue_token;
use shop_ledger::http_store::HttpLedger;
use shop_ledger::memory_store::MemoryLedger;
use shop_ledger::metrics;
use shop_ledger::server::{self, ServerState};

#[derive(Parser, Debug)]
#[command(name = "shop_ledger", version, about = "Retail shop bookkeeping with live monthly totals")]
struct Cli {
    /// Ledger API base URL (overrides LEDGER_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Open period as YYYY-MM (overrides LEDGER_PERIOD)
    #[arg(long, global = true)]
    period: Option<PeriodKey>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the in-memory ledger API
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print the aggregate totals for the open period
    Summary,
    /// List one category's records in the open period
    List { category: LedgerCategory },
    /// Record a new inventory cost, expense or sale
    Add {
        category: LedgerCategory,
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: Money,
        /// YYYY-MM-DD, defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a record by id
    Delete { category: LedgerCategory, id: String },
    #[command(subcommand)]
    Loan(LoanCmd),
    #[command(subcommand)]
    Report(ReportCmd),
    /// Print the session token for an operator (needs SESSION_SECRET)
    Token { operator: String },
}

#[derive(Subcommand, Debug)]
enum LoanCmd {
    List {
        #[arg(long)]
        kind: Option<LoanKind>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: Money,
        #[arg(long, default_value = "given")]
        kind: LoanKind,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum ReportCmd {
    List,
    /// Archive the open period's reconciled totals
    Close { month_name: String },
    Delete { id: String },
}

/// Record plus the totals after reconciliation.
#[derive(Serialize)]
struct Outcome<R: Serialize> {
    record: R,
    confirmed: bool,
    summary: Summary,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn report_reconciliation(r: &Reconciliation) {
    if let Err(e) = &r.refresh {
        warn!(error = %e, "totals shown are optimistic");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ---- Load config, CLI flags win ----
    let mut args = config::load();
    if let Some(base) = cli.api_base.clone() {
        args.api_base = base;
    }
    if let Some(period) = cli.period {
        args.period = period;
    }

    // ---- Metrics ----
    metrics::init();

    match run(cli.cmd, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cmd: Cmd, args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Cmd::Serve { listen } => {
            let addr: SocketAddr = listen.unwrap_or_else(|| args.listen.clone()).parse()?;
            let gate = args.gate();
            info!(%addr, period = %args.period, gated = gate.is_enforced(), "startup config");
            let state = Arc::new(ServerState {
                store: Arc::new(MemoryLedger::new()),
                gate,
                default_period: args.period,
            });
            server::serve(addr, state).await?;
            Ok(())
        }
        Cmd::Token { operator } => {
            let secret = args.session_secret.as_deref().ok_or("SESSION_SECRET is not set")?;
            println!("{}", issue_token(secret, &operator));
            Ok(())
        }
        cmd => session(cmd, args).await,
    }
}

/// Everything that talks to the ledger API goes through one dashboard session.
async fn session(cmd: Cmd, args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = args.metrics_port {
        metrics::serve_metrics(SocketAddr::from(([0, 0, 0, 0], port)))?;
    }

    let ledger = Arc::new(HttpLedger::new(&args.api_base, args.retry.request_timeout, args.credentials())?);
    info!(api = %ledger.base(), period = %args.period, "startup config");
    let dash = Dashboard::open(ledger.clone(), ledger, args.period, args.retry.clone()).await;
    let res = dispatch(&dash, cmd).await;
    metrics::observe(&dash.view());
    dash.teardown();
    res
}

async fn dispatch(dash: &Dashboard, cmd: Cmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Cmd::Summary => print_json(&dash.summary()),
        Cmd::List { category } => print_json(&dash.entries(category).records().await),
        Cmd::Add { category, name, amount, date, note } => {
            let mut form = NewRecord::new(name, amount, date.unwrap_or_else(today));
            if let Some(note) = note {
                form = form.with_note(note);
            }
            let done = dash.entries(category).create(form).await?;
            report_reconciliation(&done.reconciliation);
            print_json(&Outcome {
                record: done.record,
                confirmed: done.reconciliation.is_confirmed(),
                summary: dash.summary(),
            })
        }
        Cmd::Delete { category, id } => {
            let done = dash.entries(category).delete(&id).await?;
            report_reconciliation(&done.reconciliation);
            print_json(&Outcome {
                record: done.record,
                confirmed: done.reconciliation.is_confirmed(),
                summary: dash.summary(),
            })
        }
        Cmd::Loan(LoanCmd::List { kind }) => {
            let kinds = match kind {
                Some(k) => vec![k],
                None => vec![LoanKind::Given, LoanKind::Taken],
            };
            let mut out = Vec::new();
            for k in kinds {
                out.push(serde_json::json!({
                    "type": k,
                    "loans": dash.loans.records(k).await,
                    "amountDue": dash.loans.amount_due(k).await,
                }));
            }
            print_json(&out)
        }
        Cmd::Loan(LoanCmd::Add { name, amount, kind, reason, date }) => {
            let loan = dash
                .loans
                .create(NewLoan { name, amount, reason, issue_date: date.unwrap_or_else(today), kind })
                .await?;
            print_json(&loan)
        }
        Cmd::Loan(LoanCmd::Delete { id }) => {
            dash.loans.delete(&id).await?;
            info!(%id, "loan deleted");
            Ok(())
        }
        Cmd::Report(ReportCmd::List) => print_json(&dash.reports.records().await),
        Cmd::Report(ReportCmd::Close { month_name }) => print_json(&dash.reports.close_month(&month_name).await?),
        Cmd::Report(ReportCmd::Delete { id }) => {
            dash.reports.delete(&id).await?;
            info!(%id, "report deleted");
            Ok(())
        }
        Cmd::Serve { .. } | Cmd::Token { .. } => Err("not a session command".into()),
    }
}
