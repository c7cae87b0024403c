// ===============================
// src/engine.rs (Reconciliation Engine)
// ===============================
//
// Alur per mutasi:
//   1) controller selesai menulis ke store (durable)
//   2) delta optimistik -> AggregationState::apply_delta
//   3) refresh otoritatif (seq naik terus) -> AggregationState::replace
// Gagal di (3): nilai optimistik tetap, snapshot ditandai stale, retry di
// background dengan backoff. Respons lama (seq lebih kecil) dibuang.
//
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::delta;
use crate::domain::{self, AggregationSnapshot, DeltaRow, MutationIntent, PeriodKey};
use crate::error::{RefreshError, StoreError, ValidationError};
use crate::metrics;
use crate::state::AggregationState;
use crate::store::AggregateQuery;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    /// Exponential backoff with up to 50% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_backoff.saturating_mul(1u32 << attempt.min(16));
        let base = exp.min(Self::MAX_BACKOFF);
        let jitter_ms = (base.as_millis() as u64) / 2;
        let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_ms) };
        base + Duration::from_millis(jitter)
    }
}

/// What happened to one committed mutation.
#[derive(Debug)]
pub struct Reconciliation {
    pub intent: MutationIntent,
    pub row: DeltaRow,
    /// `Ok(seq)` when the authoritative snapshot for this mutation landed.
    pub refresh: Result<u64, RefreshError>,
}

impl Reconciliation {
    pub fn is_confirmed(&self) -> bool {
        self.refresh.is_ok()
    }
}

struct Inner {
    state: AggregationState,
    query: Arc<dyn AggregateQuery>,
    period: PeriodKey,
    policy: RetryPolicy,
    next_seq: AtomicU64,
    retrying: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Cheap to clone; every clone drives the same session state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<Inner>,
}

impl ReconciliationEngine {
    pub fn new(
        state: AggregationState,
        query: Arc<dyn AggregateQuery>,
        period: PeriodKey,
        policy: RetryPolicy,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                query,
                period,
                policy,
                next_seq: AtomicU64::new(0),
                retrying: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    pub fn state(&self) -> &AggregationState {
        &self.inner.state
    }

    pub fn period(&self) -> PeriodKey {
        self.inner.period
    }

    /// Step 2: optimistic, stale-tolerant feedback.
    pub fn apply_optimistic(&self, intent: &MutationIntent) -> Result<DeltaRow, ValidationError> {
        domain::validate_amount(intent.amount)?;
        let row = delta::row(intent);
        if self.inner.state.apply_delta(&row) {
            metrics::MUTATIONS
                .with_label_values(&[intent.category.label(), intent.operation.label()])
                .inc();
            metrics::observe(&self.inner.state.view());
        }
        debug!(
            category = %intent.category,
            op = intent.operation.label(),
            amount = intent.amount,
            delta = ?row.delta,
            "optimistic delta applied"
        );
        Ok(row)
    }

    /// Steps 2 and 3 for a mutation whose store write already succeeded.
    pub async fn reconcile(&self, intent: MutationIntent) -> Result<Reconciliation, ValidationError> {
        let row = self.apply_optimistic(&intent)?;
        let refresh = self.refresh().await;
        if let Err(e) = &refresh {
            if e.leaves_stale() {
                info!(
                    category = %intent.category,
                    op = intent.operation.label(),
                    seq = e.seq(),
                    error = %e,
                    "mutation committed, aggregate not confirmed"
                );
            }
        }
        Ok(Reconciliation { intent, row, refresh })
    }

    /// Authoritative refresh: recompute from the store and replace.
    pub async fn refresh(&self) -> Result<u64, RefreshError> {
        let seq = self.issue();
        match self.fetch().await {
            Ok(snapshot) => self.land(seq, snapshot),
            Err(source) => {
                self.fail(seq, &source);
                self.spawn_retry();
                Err(RefreshError::Failure { seq, source })
            }
        }
    }

    /// Session teardown. Completed writes stay; in-flight refreshes are dropped.
    pub fn teardown(&self) {
        self.inner.state.close();
        self.inner.shutdown.send_replace(true);
        info!(period = %self.inner.period, "reconciliation stopped");
    }

    fn issue(&self) -> u64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.mark_issued(seq);
        seq
    }

    async fn fetch(&self) -> Result<AggregationSnapshot, StoreError> {
        let limit = self.inner.policy.request_timeout;
        match timeout(limit, self.inner.query.compute_snapshot(self.inner.period)).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Unavailable(format!("aggregate timed out after {limit:?}"))),
        }
    }

    fn land(&self, seq: u64, snapshot: AggregationSnapshot) -> Result<u64, RefreshError> {
        match self.inner.state.replace(seq, snapshot) {
            Ok(()) => {
                metrics::REFRESHES.with_label_values(&["applied"]).inc();
                metrics::observe(&self.inner.state.view());
                debug!(seq, ?snapshot, "authoritative snapshot applied");
                Ok(seq)
            }
            Err(e) => {
                if let RefreshError::OrderingConflict { applied, .. } = &e {
                    metrics::REFRESHES.with_label_values(&["discarded"]).inc();
                    warn!(seq, applied, "late refresh response discarded");
                }
                Err(e)
            }
        }
    }

    fn fail(&self, seq: u64, source: &StoreError) {
        metrics::REFRESHES.with_label_values(&["failed"]).inc();
        if self.inner.state.mark_stale(seq) {
            metrics::observe(&self.inner.state.view());
        }
        warn!(seq, error = %source, "refresh failed; snapshot is stale");
    }

    /// One background retry loop per session, running while the state is stale.
    fn spawn_retry(&self) {
        let policy = &self.inner.policy;
        if policy.max_retries == 0 || self.inner.state.is_closed() {
            return;
        }
        if self
            .inner
            .retrying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let engine = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let max = engine.inner.policy.max_retries;
            for attempt in 0..max {
                let wait = engine.inner.policy.backoff(attempt);
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = shutdown.changed() => break,
                }
                if !engine.inner.state.is_stale() {
                    break;
                }
                metrics::REFRESHES.with_label_values(&["retried"]).inc();
                let seq = engine.issue();
                match engine.fetch().await {
                    Ok(snapshot) => {
                        if engine.land(seq, snapshot).is_ok() {
                            info!(seq, attempt = attempt + 1, "stale snapshot recovered");
                        }
                        if !engine.inner.state.is_stale() {
                            break;
                        }
                    }
                    Err(e) => engine.fail(seq, &e),
                }
            }
            if engine.inner.state.is_stale() && !engine.inner.state.is_closed() {
                warn!(retries = max, "giving up on refresh; snapshot stays stale until the next mutation");
            }
            engine.inner.retrying.store(false, Ordering::SeqCst);
        });
    }
}
