// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : shop_ledger — retail shop bookkeeping with live aggregate totals
Module  : config.rs
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
use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use tokio::time::Duration;

use crate::domain::PeriodKey;
use crate::engine::RetryPolicy;
use crate::gate::{issue_token, OperatorCredentials, SessionGate};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

#[derive(Clone, Debug)]
pub struct Args {
    // ledger API
    pub api_base: String,
    pub listen: String,
    pub period: PeriodKey,

    // refresh / retry
    pub retry: RetryPolicy,

    // metrics exporter untuk sesi client (None = mati)
    pub metrics_port: Option<u16>,

    // session gate
    pub operator: Option<String>,
    pub session_secret: Option<String>,
    pub session_token: Option<String>,
}

impl Args {
    /// Headers for outgoing requests. An explicit SESSION_TOKEN wins, else
    /// one is derived from SESSION_SECRET.
    pub fn credentials(&self) -> Option<OperatorCredentials> {
        let operator = self.operator.clone()?;
        let token = match (&self.session_token, &self.session_secret) {
            (Some(t), _) => t.clone(),
            (None, Some(secret)) => issue_token(secret, &operator),
            (None, None) => return None,
        };
        Some(OperatorCredentials { operator, token })
    }

    pub fn gate(&self) -> SessionGate {
        match &self.session_secret {
            Some(secret) => SessionGate::with_secret(secret.clone()),
            None => SessionGate::open(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        None => default,
    }
}

pub fn load() -> Args {
    // Pastikan .env dibaca (LEDGER_API_BASE, SESSION_SECRET, dll)
    let _ = dotenv();

    let api_base = var("LEDGER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let listen = var("LEDGER_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let period = parsed("LEDGER_PERIOD", PeriodKey::current());

    // ===== Retry =====
    let defaults = RetryPolicy::default();
    let retry = RetryPolicy {
        max_retries: parsed("REFRESH_MAX_RETRIES", defaults.max_retries),
        base_backoff: Duration::from_millis(parsed(
            "REFRESH_BACKOFF_MS",
            defaults.base_backoff.as_millis() as u64,
        )),
        request_timeout: Duration::from_millis(parsed(
            "REFRESH_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
        )),
    };

    let metrics_port = var("METRICS_PORT").and_then(|s| s.parse().ok());

    Args {
        api_base,
        listen,
        period,
        retry,
        metrics_port,
        operator: var("SHOP_OPERATOR"),
        session_secret: var("SESSION_SECRET"),
        session_token: var("SESSION_TOKEN"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::verify_token;

    fn args() -> Args {
        Args {
            api_base: DEFAULT_API_BASE.into(),
            listen: DEFAULT_LISTEN.into(),
            period: PeriodKey::new(2026, 10).unwrap(),
            retry: RetryPolicy::default(),
            metrics_port: None,
            operator: None,
            session_secret: None,
            session_token: None,
        }
    }

    #[test]
    fn no_operator_means_no_credentials() {
        let mut a = args();
        a.session_secret = Some("s3cret".into());
        assert_eq!(a.credentials(), None);
        assert!(a.gate().is_enforced());
    }

    #[test]
    fn token_is_derived_from_secret() {
        let mut a = args();
        a.operator = Some("rina".into());
        a.session_secret = Some("s3cret".into());
        let c = a.credentials().unwrap();
        assert!(verify_token("s3cret", "rina", &c.token));
    }

    #[test]
    fn explicit_token_wins() {
        let mut a = args();
        a.operator = Some("rina".into());
        a.session_secret = Some("s3cret".into());
        a.session_token = Some("abcd".into());
        assert_eq!(a.credentials().unwrap().token, "abcd");
    }

    #[test]
    fn open_gate_without_secret() {
        assert!(!args().gate().is_enforced());
    }
}
