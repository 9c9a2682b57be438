//! The execution bridge: a FIFO of pending requests plus a result store, both
//! behind one mutex.
//!
//! Submitters seed a `processing` result and enqueue under the same lock, so a
//! status poll that races the host thread always finds the request. The host
//! thread pops one request at a time and releases the lock while the operation
//! runs; the terminal result is written back under the lock afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hostlink_types::{EventResult, HostRequest};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::host::HostSignal;
use crate::registry::OperationRegistry;

/// Terminal results older than this are pruned on the next status read.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct StoredResult {
    result: EventResult,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BridgeState {
    queue: VecDeque<HostRequest>,
    results: HashMap<String, StoredResult>,
}

/// Shared between submitters, the HTTP front, and the host thread.
pub struct ExecutionBridge {
    state: Mutex<BridgeState>,
    signal: Arc<dyn HostSignal>,
    retention: Duration,
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("pending", &self.pending_len())
            .field("stored", &self.stored_len())
            .field("retention", &self.retention)
            .finish()
    }
}

impl ExecutionBridge {
    pub fn new(signal: Arc<dyn HostSignal>) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            signal,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Override how long terminal results stay readable.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Enqueue an operation and return its event id.
    ///
    /// The `processing` result is visible before this returns. The host signal is
    /// raised after the lock is released.
    pub fn submit(&self, operation: &str, params: Map<String, Value>) -> Result<String, BridgeError> {
        let operation = operation.trim();
        if operation.is_empty() {
            return Err(BridgeError::EmptyOperation);
        }

        let request = HostRequest {
            id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            params,
            enqueued_at: Utc::now(),
        };
        let event_id = request.id.clone();

        {
            let mut state = self.lock_state();
            state.results.insert(
                event_id.clone(),
                StoredResult {
                    result: EventResult::Processing,
                    enqueued_at: request.enqueued_at,
                },
            );
            state.queue.push_back(request);
        }

        info!(event_id = %event_id, operation, "queued host operation");
        self.signal.raise();
        Ok(event_id)
    }

    /// Run every queued request in FIFO order. Must be called on the host thread.
    ///
    /// Returns how many requests were executed. Requests enqueued while draining
    /// are picked up by the same call.
    pub fn drain_and_execute<H>(&self, registry: &OperationRegistry<H>, host: &mut H) -> usize {
        let mut executed = 0;
        while let Some(request) = self.pop_next() {
            debug!(event_id = %request.id, operation = %request.operation, "executing host operation");
            let result = match registry.execute(host, &request.operation, &request.params) {
                Ok(value) => EventResult::Completed { result: value },
                Err(failure) => {
                    error!(event_id = %request.id, operation = %request.operation, error = %failure, "host operation failed");
                    EventResult::Failed {
                        message: format!("{failure:#}"),
                    }
                }
            };
            info!(event_id = %request.id, status = result.label(), "host operation finished");

            let mut state = self.lock_state();
            state.results.insert(
                request.id,
                StoredResult {
                    result,
                    enqueued_at: request.enqueued_at,
                },
            );
            executed += 1;
        }
        executed
    }

    /// Current status for `event_id`, or `not_found` for unknown and pruned ids.
    pub fn status(&self, event_id: &str) -> EventResult {
        self.prune_expired();
        let state = self.lock_state();
        state
            .results
            .get(event_id)
            .map(|stored| stored.result.clone())
            .unwrap_or(EventResult::NotFound)
    }

    /// Drop terminal results whose age has reached the retention window.
    ///
    /// `processing` entries are kept regardless of age. Returns the number removed.
    pub fn prune_expired(&self) -> usize {
        let retention = TimeDelta::from_std(self.retention).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let mut state = self.lock_state();
        let before = state.results.len();
        state
            .results
            .retain(|_, stored| !stored.result.is_terminal() || now.signed_duration_since(stored.enqueued_at) < retention);
        let removed = before - state.results.len();
        if removed > 0 {
            debug!(removed, "pruned expired host results");
        }
        removed
    }

    /// Requests waiting for the host thread.
    pub fn pending_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Results currently readable, including `processing` ones.
    pub fn stored_len(&self) -> usize {
        self.lock_state().results.len()
    }

    fn pop_next(&self) -> Option<HostRequest> {
        self.lock_state().queue.pop_front()
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("execution bridge lock poisoned; continuing with inner state");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use anyhow::bail;
    use serde_json::json;

    use crate::host::NoopSignal;

    #[derive(Default)]
    struct CountingSignal {
        raised: AtomicUsize,
    }

    impl HostSignal for CountingSignal {
        fn raise(&self) {
            self.raised.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Journal {
        entries: Vec<i64>,
    }

    fn journal_registry() -> OperationRegistry<Journal> {
        let mut registry = OperationRegistry::new();
        registry
            .register_fn("record", |journal: &mut Journal, params| {
                let n = params.get("n").and_then(Value::as_i64).unwrap_or_default();
                journal.entries.push(n);
                Ok(json!({ "recorded": n }))
            })
            .register_fn("reject", |_: &mut Journal, _| bail!("rejected by host"));
        registry
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn quiet_bridge() -> ExecutionBridge {
        ExecutionBridge::new(Arc::new(NoopSignal))
    }

    #[test]
    fn submit_seeds_processing_and_raises_signal() {
        let signal = Arc::new(CountingSignal::default());
        let bridge = ExecutionBridge::new(signal.clone());

        let event_id = bridge.submit("record", params(json!({ "n": 1 }))).unwrap();

        assert_eq!(bridge.status(&event_id), EventResult::Processing);
        assert_eq!(bridge.pending_len(), 1);
        assert_eq!(signal.raised.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_operation_is_rejected() {
        let bridge = quiet_bridge();
        let error = bridge.submit("  ", Map::new()).unwrap_err();
        assert!(matches!(error, BridgeError::EmptyOperation));
        assert_eq!(bridge.stored_len(), 0);
    }

    #[test]
    fn event_ids_are_unique() {
        let bridge = quiet_bridge();
        let first = bridge.submit("record", Map::new()).unwrap();
        let second = bridge.submit("record", Map::new()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn drains_in_submission_order() {
        let bridge = quiet_bridge();
        let registry = journal_registry();
        let mut journal = Journal::default();

        let ids: Vec<String> = (1..=5).map(|n| bridge.submit("record", params(json!({ "n": n }))).unwrap()).collect();
        let executed = bridge.drain_and_execute(&registry, &mut journal);

        assert_eq!(executed, 5);
        assert_eq!(journal.entries, vec![1, 2, 3, 4, 5]);
        assert_eq!(bridge.pending_len(), 0);
        assert_eq!(
            bridge.status(&ids[2]),
            EventResult::Completed {
                result: json!({ "recorded": 3 })
            }
        );
    }

    #[test]
    fn failures_do_not_block_later_requests() {
        let bridge = quiet_bridge();
        let registry = journal_registry();
        let mut journal = Journal::default();

        let rejected = bridge.submit("reject", Map::new()).unwrap();
        let unknown = bridge.submit("teleport", Map::new()).unwrap();
        let recorded = bridge.submit("record", params(json!({ "n": 9 }))).unwrap();
        bridge.drain_and_execute(&registry, &mut journal);

        assert_eq!(
            bridge.status(&rejected),
            EventResult::Failed {
                message: "rejected by host".into()
            }
        );
        assert_eq!(
            bridge.status(&unknown),
            EventResult::Failed {
                message: "operation 'teleport' is not implemented".into()
            }
        );
        assert!(matches!(bridge.status(&recorded), EventResult::Completed { .. }));
        assert_eq!(journal.entries, vec![9]);
    }

    #[test]
    fn terminal_results_are_stable_across_reads() {
        let bridge = quiet_bridge();
        let event_id = bridge.submit("record", params(json!({ "n": 2 }))).unwrap();
        bridge.drain_and_execute(&journal_registry(), &mut Journal::default());

        let first = bridge.status(&event_id);
        let second = bridge.status(&event_id);
        assert!(first.is_terminal());
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_id_is_not_found() {
        assert_eq!(quiet_bridge().status("no-such-event"), EventResult::NotFound);
    }

    #[test]
    fn expired_terminal_results_are_pruned_but_processing_is_kept() {
        let bridge = quiet_bridge().with_retention(Duration::ZERO);
        let registry = journal_registry();

        let finished = bridge.submit("record", Map::new()).unwrap();
        bridge.drain_and_execute(&registry, &mut Journal::default());
        let waiting = bridge.submit("record", Map::new()).unwrap();

        assert_eq!(bridge.status(&finished), EventResult::NotFound);
        assert_eq!(bridge.status(&waiting), EventResult::Processing);
        assert_eq!(bridge.stored_len(), 1);
    }

    #[test]
    fn results_within_retention_survive_pruning() {
        let bridge = quiet_bridge();
        let event_id = bridge.submit("record", Map::new()).unwrap();
        bridge.drain_and_execute(&journal_registry(), &mut Journal::default());

        assert_eq!(bridge.retention(), DEFAULT_RETENTION);
        assert_eq!(bridge.prune_expired(), 0);
        assert!(bridge.status(&event_id).is_terminal());
    }

    #[test]
    fn concurrent_submitters_are_all_executed() {
        let bridge = Arc::new(quiet_bridge());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    (0..25)
                        .map(|n| bridge.submit("record", params(json!({ "n": worker * 100 + n }))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

        let mut journal = Journal::default();
        let executed = bridge.drain_and_execute(&journal_registry(), &mut journal);

        assert_eq!(executed, 200);
        assert_eq!(journal.entries.len(), 200);
        assert!(ids.iter().all(|id| bridge.status(id).is_terminal()));
    }
}
