//! Single Flight - Per-Key Load Coalescing
//!
//! At most one producer runs per key at a time. Callers that arrive while a
//! producer is in flight wait for its result instead of starting their own.
//! Nothing is cached here: once the producer finishes, the next call for the
//! key starts a fresh one.
//!
//! # Mechanics
//!
//! The first caller spawns the producer on the tokio runtime and installs a
//! ticket holding a shared handle to the task's result. Every caller, the
//! first included, awaits that shared handle. This gives:
//!
//! - **Cancellation isolation**: a caller that stops waiting (timeout, dropped
//!   request) does not cancel the producer; other waiters still get the value.
//! - **Panic safety**: the ticket is removed by a drop guard inside the task,
//!   so a panicking producer releases the key, and every waiter receives
//!   [`CacheError::LoadAborted`]. A producer closure that panics before
//!   returning its future unwinds into the caller that invoked it; the ticket
//!   is still released and joined waiters still get `LoadAborted`.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

type SharedLoad<T> = Shared<BoxFuture<'static, CacheResult<T>>>;

struct Ticket<T> {
    id: u64,
    result: SharedLoad<T>,
}

/// RAII cleanup guard for in-flight ticket tracking
/// Removes the ticket when the producer task finishes, even on panic
struct TicketGuard<T> {
    map: Arc<DashMap<String, Ticket<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for TicketGuard<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.map.remove_if(&self.key, |_, ticket| ticket.id == id);
    }
}

/// Per-key deduplicated loader
///
/// Requires a tokio runtime: producers run as spawned tasks.
pub struct SingleFlight<T> {
    in_flight: Arc<DashMap<String, Ticket<T>>>,
    next_id: AtomicU64,
    coalesced: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run `producer` for `key` unless a run for `key` is already in flight
    ///
    /// `producer` is only called (and its future only built) by the caller
    /// that installs the ticket.
    ///
    /// # Errors
    ///
    /// Returns whatever the producer returned, or [`CacheError::LoadAborted`]
    /// if the producer panicked.
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        // The shard lock is released before the producer is called, so a
        // producer that panics or re-enters this map cannot deadlock it.
        let (shared, start) = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "[SingleFlight] Joined in-flight load");
                (entry.get().result.clone(), None)
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<JoinHandle<CacheResult<T>>>();

                let owned_key = key.to_string();
                let result = async move {
                    let Ok(handle) = rx.await else {
                        return Err(CacheError::LoadAborted {
                            key: owned_key,
                            reason: "producer panicked before starting".to_string(),
                        });
                    };
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(err) => Err(CacheError::LoadAborted {
                            key: owned_key,
                            reason: abort_reason(err),
                        }),
                    }
                }
                .boxed()
                .shared();

                entry.insert(Ticket {
                    id,
                    result: result.clone(),
                });
                (result, Some((id, tx)))
            }
        };

        if let Some((id, tx)) = start {
            // Dropped during unwinding if `producer` panics, which releases the key
            let guard = TicketGuard {
                map: Arc::clone(&self.in_flight),
                key: key.to_string(),
                id,
            };
            let load = producer();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                load.await
            });
            // The receiver lives in `shared`, which this caller still holds
            let _ = tx.send(handle);
            debug!(key = %key, "[SingleFlight] Started load");
        }

        shared.await
    }

    /// Number of keys with a load currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of calls that joined an existing load instead of starting one
    #[must_use]
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn abort_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return "producer task cancelled".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match message {
        Some(message) => format!("producer panicked: {message}"),
        None => "producer panicked".to_string(),
    }
}
