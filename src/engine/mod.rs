//! The aggregation engine.
//!
//! The engine folds a `LedgerSnapshot` into a `Bilancial`: one `BilancialInformation` per active
//! separator plus the opening and closing balance of every account. Every recompute is a full
//! re-walk of the merged timeline, so a published result never depends on an earlier one.
//!
//! `recompute` does the work on the calling thread. `follow` spawns a task that watches the
//! ledger and the filter, runs each fold with `spawn_blocking`, and cancels a fold as soon as a
//! newer change arrives. A result is only published when it is at least as fresh as the one it
//! replaces.

pub(crate) mod aggregate;
mod bilancial;
mod overlay;

pub use bilancial::{
    Bilancial, BilancialInformation, BilancialMapping, CategorySums, Checkpoint, Sum,
};
pub use overlay::{
    CategoryOverlay, OverlayFlags, OverlayKind, OverlayNode, OverlayRow, OverlayState,
    INDIVIDUAL_LABEL, ROOT_LABEL,
};

use crate::error::Res;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::model::{CategoryRegistry, EntryFilter};
use anyhow::Context;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Where the engine stands relative to the latest ledger and filter.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// The ledger or the filter changed after the last published result.
    Stale,
    Computing,
    /// The published result matches `revision` and `filter_generation`.
    Ready,
}

serde_plain::derive_display_from_serialize!(EngineState);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EngineStatus {
    pub state: EngineState,
    /// The newest ledger revision the engine knows of.
    pub revision: u64,
    pub filter_generation: u64,
    /// Folds abandoned by the follower because a newer change arrived.
    pub cancelled: u64,
}

/// A cooperative cancellation flag shared between the follower and a running fold.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default)]
struct FilterState {
    generation: u64,
    filter: EntryFilter,
}

#[derive(Debug)]
struct Inner {
    filter: watch::Sender<FilterState>,
    status: watch::Sender<EngineStatus>,
    published: RwLock<Option<Arc<Bilancial>>>,
}

/// Computes and publishes `Bilancial` results for one ledger. Clones share the same state.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    registry: Arc<CategoryRegistry>,
    ledger: watch::Receiver<LedgerSnapshot>,
    inner: Arc<Inner>,
}

impl AggregationEngine {
    pub fn new(registry: Arc<CategoryRegistry>, ledger: watch::Receiver<LedgerSnapshot>) -> Self {
        let (filter, _) = watch::channel(FilterState::default());
        let (status, _) = watch::channel(EngineStatus {
            state: EngineState::Stale,
            revision: 0,
            filter_generation: 0,
            cancelled: 0,
        });
        Self {
            registry,
            ledger,
            inner: Arc::new(Inner {
                filter,
                status,
                published: RwLock::new(None),
            }),
        }
    }

    /// The current status. A ledger revision newer than the one last computed makes the engine
    /// `Stale` even when no follower is running.
    pub fn status(&self) -> EngineStatus {
        let mut status = *self.inner.status.borrow();
        let latest = self.ledger.borrow().revision();
        if latest > status.revision {
            status.state = EngineState::Stale;
            status.revision = latest;
        }
        status
    }

    pub fn state(&self) -> EngineState {
        self.status().state
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }

    pub fn filter(&self) -> EntryFilter {
        self.inner.filter.borrow().filter.clone()
    }

    /// Replaces the entry filter. The engine becomes stale until the next result is published.
    pub fn set_filter(&self, filter: EntryFilter) {
        let mut generation = 0;
        self.inner.filter.send_modify(|state| {
            state.generation += 1;
            state.filter = filter;
            generation = state.generation;
        });
        debug!("Filter changed, generation {generation}");
        self.inner.status.send_modify(|status| {
            status.state = EngineState::Stale;
            status.filter_generation = generation;
        });
    }

    /// The most recently published result.
    pub fn published(&self) -> Option<Arc<Bilancial>> {
        self.inner
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Folds `snapshot` on the calling thread and publishes the result.
    pub fn recompute(&self, snapshot: &LedgerSnapshot) -> Res<Arc<Bilancial>> {
        let FilterState { generation, filter } = self.inner.filter.borrow().clone();
        self.set_status(EngineState::Computing, snapshot.revision(), generation);
        let tree = self.registry.tree();
        let cancel = CancelFlag::new();
        let bilancial = aggregate::aggregate(snapshot, &tree, &filter, generation, &cancel)
            .map(Arc::new)
            .context("The aggregation was cancelled")?;
        self.publish(bilancial.clone());
        Ok(bilancial)
    }

    /// Spawns the follower task. It recomputes whenever the ledger or the filter changes and
    /// stops when the ledger is dropped.
    pub fn follow(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let ledger = self.ledger.clone();
        tokio::spawn(async move { engine.run(ledger).await })
    }

    /// Waits until a result for at least `revision` and the current filter is published.
    pub async fn wait_ready(&self, revision: u64) -> Res<Arc<Bilancial>> {
        let generation = self.inner.filter.borrow().generation;
        let mut status = self.inner.status.subscribe();
        status
            .wait_for(|s| {
                s.state == EngineState::Ready
                    && s.revision >= revision
                    && s.filter_generation >= generation
            })
            .await
            .context("The aggregation engine stopped")?;
        self.published()
            .context("The aggregation engine is ready but has published nothing")
    }

    async fn run(self, mut ledger: watch::Receiver<LedgerSnapshot>) {
        let mut filter = self.inner.filter.subscribe();
        loop {
            let snapshot = ledger.borrow_and_update().clone();
            let FilterState {
                generation,
                filter: entry_filter,
            } = filter.borrow_and_update().clone();
            let revision = snapshot.revision();
            self.set_status(EngineState::Computing, revision, generation);
            trace!("Recomputing revision {revision}, filter generation {generation}");

            let cancel = CancelFlag::new();
            let task = {
                let tree = self.registry.tree();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    aggregate::aggregate(&snapshot, &tree, &entry_filter, generation, &cancel)
                })
            };

            let alive = tokio::select! {
                joined = task => {
                    match joined {
                        Ok(Some(bilancial)) => self.publish(Arc::new(bilancial)),
                        Ok(None) => debug!("Recompute of revision {revision} was cancelled"),
                        Err(e) => warn!("Recompute of revision {revision} failed: {e}"),
                    }
                    tokio::select! {
                        changed = ledger.changed() => changed.is_ok(),
                        changed = filter.changed() => changed.is_ok(),
                    }
                }
                changed = ledger.changed() => {
                    self.abandon(&cancel);
                    debug!("Ledger changed during recompute of revision {revision}");
                    changed.is_ok()
                }
                changed = filter.changed() => {
                    self.abandon(&cancel);
                    debug!("Filter changed during recompute of revision {revision}");
                    changed.is_ok()
                }
            };
            if !alive {
                debug!("The ledger was dropped, stopping the aggregation follower");
                break;
            }
            self.inner
                .status
                .send_modify(|status| status.state = EngineState::Stale);
        }
    }

    fn abandon(&self, cancel: &CancelFlag) {
        cancel.cancel();
        self.inner.status.send_modify(|status| status.cancelled += 1);
    }

    fn set_status(&self, state: EngineState, revision: u64, filter_generation: u64) {
        self.inner.status.send_modify(|status| {
            status.state = state;
            status.revision = status.revision.max(revision);
            status.filter_generation = status.filter_generation.max(filter_generation);
        });
    }

    /// Stores `bilancial` unless something fresher is already published, then reports `Ready`
    /// if the published result matches the newest known revision and filter.
    fn publish(&self, bilancial: Arc<Bilancial>) {
        let key = (bilancial.revision(), bilancial.filter_generation());
        let current = {
            let mut published = self
                .inner
                .published
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match published.as_ref() {
                Some(current) if (current.revision(), current.filter_generation()) > key => {
                    debug!(
                        "Discarding result for revision {} behind published revision {}",
                        key.0,
                        current.revision()
                    );
                    (current.revision(), current.filter_generation())
                }
                _ => {
                    *published = Some(bilancial);
                    debug!("Published aggregation of revision {}", key.0);
                    key
                }
            }
        };
        self.inner.status.send_modify(|status| {
            if (status.revision, status.filter_generation) == current {
                status.state = EngineState::Ready;
            }
        });
    }
}

/// The ledger, the category registry and the engine that aggregates them.
#[derive(Debug)]
pub struct Books {
    registry: Arc<CategoryRegistry>,
    ledger: Ledger,
    engine: AggregationEngine,
    follower: Option<JoinHandle<()>>,
}

impl Books {
    pub fn new(registry: Arc<CategoryRegistry>, ledger: Ledger) -> Self {
        let engine = AggregationEngine::new(registry.clone(), ledger.subscribe());
        Self {
            registry,
            ledger,
            engine,
            follower: None,
        }
    }

    pub fn registry(&self) -> &Arc<CategoryRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Starts the follower task unless it is already running. Needs a tokio runtime.
    pub fn start(&mut self) {
        if self.follower.is_none() {
            self.follower = Some(self.engine.follow());
        }
    }

    /// Recomputes the current ledger on the calling thread.
    pub fn refresh(&self) -> Res<Arc<Bilancial>> {
        self.engine.recompute(&self.ledger.snapshot())
    }

    /// Waits for the follower to catch up with the current ledger revision.
    pub async fn settled(&self) -> Res<Arc<Bilancial>> {
        self.engine.wait_ready(self.ledger.revision()).await
    }
}

impl Drop for Books {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountId, Entry};
    use crate::test::{Fixture, BANK, CASH};
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::time::timeout;

    const PATIENCE: Duration = Duration::from_secs(10);

    fn books() -> (Fixture, Books) {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        fx.book("Rent", -20, 2, "Rent", BANK);
        let books = Books::new(fx.registry.clone(), std::mem::take(&mut fx.ledger));
        (fx, books)
    }

    #[test]
    fn test_recompute_publishes() {
        let (_fx, books) = books();
        assert_eq!(books.engine().state(), EngineState::Stale);
        assert!(books.engine().published().is_none());

        let bilancial = books.refresh().unwrap();
        assert_eq!(bilancial.revision(), books.ledger().revision());
        assert_eq!(bilancial.total(), Decimal::from(30));
        assert_eq!(books.engine().state(), EngineState::Ready);
        assert!(Arc::ptr_eq(&books.engine().published().unwrap(), &bilancial));
    }

    #[test]
    fn test_older_result_never_replaces_a_newer_one() {
        let (fx, mut books) = books();
        let old = books.ledger().snapshot();
        let entry = fx.entry("Snacks", -8, 3, "Food", CASH);
        books.ledger_mut().add_entry(entry).unwrap();
        let new = books.ledger().snapshot();

        books.engine().recompute(&new).unwrap();
        books.engine().recompute(&old).unwrap();
        let published = books.engine().published().unwrap();
        assert_eq!(published.revision(), new.revision());
        assert_eq!(published.total(), Decimal::from(22));
        assert_eq!(books.engine().state(), EngineState::Ready);
    }

    #[test]
    fn test_set_filter_makes_the_engine_stale() {
        let (_fx, books) = books();
        books.refresh().unwrap();
        books
            .engine()
            .set_filter(EntryFilter::Account(AccountId::new(BANK)));
        let status = books.engine().status();
        assert_eq!(status.state, EngineState::Stale);
        assert_eq!(status.filter_generation, 1);

        let filtered = books.refresh().unwrap();
        assert_eq!(filtered.filter_generation(), 1);
        assert_eq!(filtered.total(), Decimal::from(-20));
        assert_eq!(books.engine().state(), EngineState::Ready);
    }

    #[test]
    fn test_ledger_change_makes_the_engine_stale() {
        let (fx, mut books) = books();
        books.refresh().unwrap();
        assert_eq!(books.engine().state(), EngineState::Ready);

        let entry = fx.entry("Snacks", -8, 3, "Food", CASH);
        books.ledger_mut().add_entry(entry).unwrap();
        let status = books.engine().status();
        assert_eq!(status.state, EngineState::Stale);
        assert_eq!(status.revision, books.ledger().revision());
        assert!(books.engine().published().unwrap().revision() < status.revision);

        books.refresh().unwrap();
        assert_eq!(books.engine().state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_ledger_change_cancels_the_fold_in_flight() {
        let mut fx = Fixture::new();
        let entries: Vec<Entry> = (0..100_000u32)
            .map(|i| fx.entry(&format!("Item {i}"), 1, i % 28 + 1, "Food", CASH))
            .collect();
        fx.ledger.add_entries(entries).unwrap();
        let mut books = Books::new(fx.registry.clone(), std::mem::take(&mut fx.ledger));
        let first = books.ledger().revision();

        let mut status = books.engine().subscribe_status();
        books.start();
        let computing =
            status.wait_for(|s| s.state == EngineState::Computing && s.revision == first);
        timeout(PATIENCE, computing).await.unwrap().unwrap();

        let entry = fx.entry("Late", -1, 28, "Food", CASH);
        books.ledger_mut().add_entry(entry).unwrap();
        let settled = timeout(PATIENCE, books.settled()).await.unwrap().unwrap();
        assert_eq!(settled.revision(), first + 1);
        assert_eq!(settled.total(), Decimal::from(99_999));
        assert_eq!(books.engine().status().cancelled, 1);
        assert_eq!(books.engine().published().unwrap().revision(), first + 1);
    }

    #[tokio::test]
    async fn test_follower_tracks_the_ledger() {
        let (fx, mut books) = books();
        books.start();
        let first = timeout(PATIENCE, books.settled()).await.unwrap().unwrap();
        assert_eq!(first.total(), Decimal::from(30));

        // A burst of changes; only the latest state has to be published.
        for d in 3..=9 {
            let entry = fx.entry("Snacks", -1, d, "Food", CASH);
            books.ledger_mut().add_entry(entry).unwrap();
        }
        let latest = timeout(PATIENCE, books.settled()).await.unwrap().unwrap();
        assert_eq!(latest.revision(), books.ledger().revision());
        assert_eq!(latest.total(), Decimal::from(23));
        assert_eq!(
            latest.account_after(&AccountId::new(CASH)),
            Decimal::from(143)
        );
    }

    #[tokio::test]
    async fn test_follower_applies_filter_changes() {
        let (_fx, mut books) = books();
        books.start();
        timeout(PATIENCE, books.settled()).await.unwrap().unwrap();

        books
            .engine()
            .set_filter(EntryFilter::Account(AccountId::new(CASH)));
        let filtered = timeout(PATIENCE, books.settled()).await.unwrap().unwrap();
        assert_eq!(filtered.filter_generation(), 1);
        assert_eq!(filtered.total(), Decimal::from(50));
    }

    #[tokio::test]
    async fn test_follower_stops_with_the_ledger() {
        let fx = Fixture::new();
        let engine = AggregationEngine::new(fx.registry.clone(), fx.ledger.subscribe());
        let handle = engine.follow();
        drop(fx);
        timeout(PATIENCE, handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
