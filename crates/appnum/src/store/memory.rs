use core::future::{self, Future};
use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::{
    CounterTransaction, CreateOutcome, MAX_LAST_NUMBER, SequenceCounter, SequenceKey, SystemClock,
    TimeSource, TransactionStatus,
};

/// Errors produced by [`MemoryTransaction`].
///
/// Any failed statement aborts the transaction, after which every further
/// statement fails with [`MemoryError::Aborted`] and [`commit`] rolls back.
///
/// [`commit`]: MemoryTransaction::commit
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MemoryError {
    /// An update targeted a row this transaction has not locked.
    #[error("counter {0} is not locked by this transaction")]
    RowNotLocked(SequenceKey),

    /// The counter cannot grow any further.
    #[error("counter {0} overflowed")]
    Overflow(SequenceKey),

    /// An earlier statement failed; the transaction can only roll back.
    #[error("transaction is aborted")]
    Aborted,
}

#[derive(Debug, Default)]
struct Row {
    lock: Arc<RowLock<()>>,
    // `None` until the creating transaction commits.
    committed: Mutex<Option<SequenceCounter>>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Mutex<HashMap<SequenceKey, Arc<Row>>>,
}

/// An in-process counter table with row locks and transactional visibility.
///
/// Each row carries an async mutex. A [`MemoryTransaction`] holds the owned
/// guard of every row it locked or created until it commits, rolls back, or
/// is dropped, so concurrent transactions on the same key queue up exactly
/// like `SELECT ... FOR UPDATE`. Writes stay private to the transaction and
/// are published on commit.
///
/// Clones share the same table.
///
/// ## Recommended When
/// - Tests and examples that need real blocking and rollback behavior
/// - Single-process deployments without a relational database
///
/// ## See Also
/// - [`CounterTransaction`] for `sqlx::Transaction<'_, Postgres>` (feature
///   `postgres`)
#[derive(Clone, Debug)]
pub struct MemoryStore<T = SystemClock> {
    table: Arc<Table>,
    time: T,
}

impl MemoryStore<SystemClock> {
    /// Creates an empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_time(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryStore<T>
where
    T: TimeSource + Clone,
{
    /// Creates an empty store whose audit timestamps come from `time`.
    pub fn with_time(time: T) -> Self {
        Self {
            table: Arc::default(),
            time,
        }
    }

    /// Opens a transaction.
    pub fn begin(&self) -> MemoryTransaction<T> {
        MemoryTransaction {
            store: self.clone(),
            held: HashMap::new(),
            status: TransactionStatus::Active,
        }
    }

    /// Returns the committed state of a counter, ignoring open transactions.
    pub fn counter(&self, key: &SequenceKey) -> Option<SequenceCounter> {
        let row = self.row(key)?;
        row.committed.lock().clone()
    }

    /// Returns every committed counter, ordered by key.
    pub fn counters(&self) -> Vec<SequenceCounter> {
        let rows: Vec<_> = self.table.rows.lock().values().cloned().collect();
        let mut counters: Vec<_> = rows
            .iter()
            .filter_map(|row| row.committed.lock().clone())
            .collect();
        counters.sort_by_key(SequenceCounter::key);
        counters
    }

    #[cfg(test)]
    pub(crate) fn row_count(&self) -> usize {
        self.table.rows.lock().len()
    }

    fn row(&self, key: &SequenceKey) -> Option<Arc<Row>> {
        self.table.rows.lock().get(key).cloned()
    }
}

#[derive(Debug)]
struct HeldRow {
    row: Arc<Row>,
    pending: SequenceCounter,
    _guard: OwnedMutexGuard<()>,
}

/// An open transaction on a [`MemoryStore`].
///
/// Dropping the transaction without calling [`commit`] rolls it back.
///
/// [`commit`]: MemoryTransaction::commit
#[derive(Debug)]
pub struct MemoryTransaction<T = SystemClock> {
    store: MemoryStore<T>,
    held: HashMap<SequenceKey, HeldRow>,
    status: TransactionStatus,
}

impl<T> MemoryTransaction<T> {
    /// Publishes every row written by this transaction and releases its
    /// locks.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Aborted`] if a statement failed earlier. The
    /// transaction is rolled back in that case.
    pub fn commit(mut self) -> Result<(), MemoryError> {
        if self.status == TransactionStatus::Aborted {
            return Err(MemoryError::Aborted);
        }
        for held in core::mem::take(&mut self.held).into_values() {
            // Publish before the guard drops so the next holder sees it.
            *held.row.committed.lock() = Some(held.pending);
        }
        Ok(())
    }

    /// Discards every write and releases the locks.
    pub fn rollback(self) {}

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    fn ensure_active(&self) -> Result<(), MemoryError> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Aborted => Err(MemoryError::Aborted),
        }
    }

    fn abort(&mut self, err: MemoryError) -> MemoryError {
        self.status = TransactionStatus::Aborted;
        err
    }
}

impl<T> Drop for MemoryTransaction<T> {
    // Rolls back whatever is still held. A row this transaction created and
    // never committed is removed from the table unless another transaction
    // is already waiting on it.
    fn drop(&mut self) {
        for (key, held) in self.held.drain() {
            if held.row.committed.lock().is_some() {
                continue;
            }
            let mut rows = self.store.table.rows.lock();
            // Clones of the row are only taken under the table lock, so the
            // table's copy and ours being the last two means nobody waits.
            if rows.get(&key).is_some_and(|row| Arc::ptr_eq(row, &held.row))
                && Arc::strong_count(&held.row) == 2
            {
                rows.remove(&key);
            }
        }
    }
}

impl<T> CounterTransaction for MemoryTransaction<T>
where
    T: TimeSource + Clone + Send + Sync,
{
    type Err = MemoryError;

    fn status(&mut self) -> impl Future<Output = Result<TransactionStatus, Self::Err>> + Send {
        future::ready(Ok(self.status))
    }

    fn lock_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        async move {
            self.ensure_active()?;
            if let Some(held) = self.held.get(key) {
                return Ok(Some(held.pending.clone()));
            }

            let Some(row) = self.store.row(key) else {
                return Ok(None);
            };
            let guard = row.lock.clone().lock_owned().await;
            let committed = row.committed.lock().clone();

            // The creator rolled back: the row never existed.
            let Some(current) = committed else {
                return Ok(None);
            };
            self.held.insert(
                key.clone(),
                HeldRow {
                    row,
                    pending: current.clone(),
                    _guard: guard,
                },
            );
            Ok(Some(current))
        }
    }

    fn create_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<CreateOutcome, Self::Err>> + Send {
        async move {
            self.ensure_active()?;
            if self.held.contains_key(key) {
                return Ok(CreateOutcome::Conflict);
            }

            let fresh = SequenceCounter::fresh(key, self.store.time.now());
            let row = Arc::new(Row::default());
            let guard = row.lock.clone().lock_owned().await;

            let existing = {
                let mut rows = self.store.table.rows.lock();
                match rows.get(key) {
                    Some(existing) => Some(existing.clone()),
                    None => {
                        rows.insert(key.clone(), row.clone());
                        None
                    }
                }
            };

            let (row, guard) = match existing {
                None => (row, guard),
                Some(existing) => {
                    drop(guard);
                    // Wait for whoever holds the row, like a unique index
                    // waits on an uncommitted insert.
                    let guard = existing.lock.clone().lock_owned().await;
                    if existing.committed.lock().is_some() {
                        return Ok(CreateOutcome::Conflict);
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%key, "previous creator rolled back, taking over the row");
                    (existing, guard)
                }
            };

            self.held.insert(
                key.clone(),
                HeldRow {
                    row,
                    pending: fresh.clone(),
                    _guard: guard,
                },
            );
            Ok(CreateOutcome::Created(fresh))
        }
    }

    fn increment(
        &mut self,
        counter: &SequenceCounter,
    ) -> impl Future<Output = Result<SequenceCounter, Self::Err>> + Send {
        async move {
            self.ensure_active()?;
            let key = counter.key();
            let now = self.store.time.now();

            let result = match self.held.get_mut(&key) {
                None => Err(MemoryError::RowNotLocked(key)),
                Some(held) => match held.pending.last_number.checked_add(1) {
                    Some(next) if next <= MAX_LAST_NUMBER => {
                        held.pending.last_number = next;
                        held.pending.updated_at = now;
                        Ok(held.pending.clone())
                    }
                    _ => Err(MemoryError::Overflow(key)),
                },
            };
            result.map_err(|err| self.abort(err))
        }
    }

    fn read_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        async move {
            self.ensure_active()?;
            if let Some(held) = self.held.get(key) {
                return Ok(Some(held.pending.clone()));
            }
            Ok(self.store.counter(key))
        }
    }
}
