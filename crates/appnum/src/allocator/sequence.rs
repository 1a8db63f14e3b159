#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AcademicYear, ApplicationNumber, CounterTransaction, CreateOutcome, DEFAULT_PAD_WIDTH, Error,
    InstituteId, InstituteLookup, PreconditionError, Result, SequenceCounter, SequenceKey,
    TransactionStatus,
};

/// Issues application numbers from per-institute, per-academic-year counters.
///
/// The allocator participates in a transaction owned by the caller. Each call
/// to [`allocate`] locks the counter row of its key, increments it, and
/// returns the formatted number; the lock is held until the caller commits
/// or rolls back. Concurrent allocations for the same key therefore queue up
/// behind each other, while different keys never interact.
///
/// ## Guarantees
/// - Committed numbers for a key are exactly `1, 2, 3, ...` with no
///   duplicates and no gaps
/// - A rolled-back allocation gives its number back to the next caller
/// - Commit order, not call order, decides which caller gets which number
///
/// # Example
/// ```
/// # #[cfg(feature = "memory")] {
/// use appnum::{Institute, InstituteId, MemoryStore, SequenceAllocator, StaticDirectory};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let institute = InstituteId::new_v4();
/// let directory: StaticDirectory = [Institute::new(institute, "PGC")].into_iter().collect();
/// let allocator = SequenceAllocator::new(directory);
/// let store = MemoryStore::new();
///
/// let mut tx = store.begin();
/// let number = allocator.allocate(&mut tx, institute, "2026").await.unwrap();
/// tx.commit().unwrap();
///
/// assert_eq!(number.to_string(), "PGC-2026-00001");
/// # });
/// # }
/// ```
///
/// [`allocate`]: SequenceAllocator::allocate
#[derive(Clone, Debug)]
pub struct SequenceAllocator<L> {
    lookup: L,
    pad_width: usize,
}

impl<L> SequenceAllocator<L> {
    /// Creates an allocator that resolves institute codes through `lookup`
    /// and pads numbers to [`DEFAULT_PAD_WIDTH`] digits.
    pub const fn new(lookup: L) -> Self {
        Self {
            lookup,
            pad_width: DEFAULT_PAD_WIDTH,
        }
    }

    /// Changes the minimum number of digits of the sequential part.
    ///
    /// Numbers wider than `pad_width` are never truncated.
    #[must_use]
    pub fn with_pad_width(mut self, pad_width: usize) -> Self {
        self.pad_width = pad_width;
        self
    }

    pub const fn lookup(&self) -> &L {
        &self.lookup
    }

    pub const fn pad_width(&self) -> usize {
        self.pad_width
    }

    /// Issues the next application number for `institute_id` and
    /// `academic_year` inside the caller's transaction.
    ///
    /// The counter row is created on first use. If another transaction
    /// creates it at the same moment, this call locks the other
    /// transaction's row and continues from there. The call waits while
    /// another open transaction holds the same key.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] if the academic year is blank, the institute
    ///   does not exist, or it has no code. Nothing is written.
    /// - [`Error::TransactionState`] if the transaction is aborted.
    /// - [`Error::Exhausted`] if the counter cannot grow further.
    /// - [`Error::Store`] for any store failure, unchanged. The caller should
    ///   roll back.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, tx), err(Debug))
    )]
    pub async fn allocate<Tx>(
        &self,
        tx: &mut Tx,
        institute_id: InstituteId,
        academic_year: &str,
    ) -> Result<ApplicationNumber, Error<Tx::Err>>
    where
        Tx: CounterTransaction,
        L: InstituteLookup<Tx>,
    {
        let key = SequenceKey::new(institute_id, AcademicYear::new(academic_year)?);
        ensure_active(tx).await?;
        let code = self.institute_code(tx, institute_id).await?;

        let counter = lock_or_create(tx, &key).await?;
        if !counter.has_room() {
            return Err(Error::Exhausted { key });
        }
        let counter = tx.increment(&counter).await.map_err(Error::Store)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%key, last_number = counter.last_number, "issued application number");

        Ok(ApplicationNumber::with_width(
            code,
            counter.academic_year,
            counter.last_number,
            self.pad_width,
        ))
    }

    /// Returns how many numbers have been issued for a key, as seen by `tx`.
    ///
    /// This is a plain read: it takes no lock, never creates a row, and
    /// returns `0` for a key that has no counter yet.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] if the academic year is blank.
    /// - [`Error::TransactionState`] if the transaction is aborted.
    /// - [`Error::Store`] for any store failure.
    pub async fn last_issued<Tx>(
        &self,
        tx: &mut Tx,
        institute_id: InstituteId,
        academic_year: &str,
    ) -> Result<u64, Error<Tx::Err>>
    where
        Tx: CounterTransaction,
    {
        let key = SequenceKey::new(institute_id, AcademicYear::new(academic_year)?);
        ensure_active(tx).await?;
        let counter = tx.read_counter(&key).await.map_err(Error::Store)?;
        Ok(counter.map_or(0, |counter| counter.last_number))
    }

    /// Returns the most recent number issued for a key, as seen by `tx`, or
    /// `None` if nothing has been issued yet.
    ///
    /// Like [`last_issued`] this takes no lock and never creates a row. The
    /// institute code is resolved so the number renders exactly as
    /// [`allocate`] returned it.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] as for [`allocate`].
    /// - [`Error::TransactionState`] if the transaction is aborted.
    /// - [`Error::Store`] for any store failure.
    ///
    /// [`allocate`]: SequenceAllocator::allocate
    /// [`last_issued`]: SequenceAllocator::last_issued
    pub async fn last_issued_number<Tx>(
        &self,
        tx: &mut Tx,
        institute_id: InstituteId,
        academic_year: &str,
    ) -> Result<Option<ApplicationNumber>, Error<Tx::Err>>
    where
        Tx: CounterTransaction,
        L: InstituteLookup<Tx>,
    {
        let key = SequenceKey::new(institute_id, AcademicYear::new(academic_year)?);
        ensure_active(tx).await?;
        let code = self.institute_code(tx, institute_id).await?;
        let counter = tx.read_counter(&key).await.map_err(Error::Store)?;

        Ok(counter
            .filter(|counter| counter.last_number > 0)
            .map(|counter| {
                ApplicationNumber::with_width(
                    code,
                    counter.academic_year,
                    counter.last_number,
                    self.pad_width,
                )
            }))
    }

    async fn institute_code<Tx>(
        &self,
        tx: &mut Tx,
        institute_id: InstituteId,
    ) -> Result<String, Error<Tx::Err>>
    where
        Tx: CounterTransaction,
        L: InstituteLookup<Tx>,
    {
        let institute = self
            .lookup
            .find_institute(tx, institute_id)
            .await
            .map_err(Error::Store)?
            .ok_or(PreconditionError::InstituteNotFound(institute_id))?;
        Ok(institute.require_code()?.to_owned())
    }
}

async fn ensure_active<Tx>(tx: &mut Tx) -> Result<(), Error<Tx::Err>>
where
    Tx: CounterTransaction,
{
    match tx.status().await.map_err(Error::Store)? {
        TransactionStatus::Active => Ok(()),
        status => Err(Error::TransactionState { status }),
    }
}

/// Locks the counter for `key`, creating it first if it does not exist.
///
/// A create that loses against a concurrent creator falls back to locking the
/// winner's row exactly once.
async fn lock_or_create<Tx>(
    tx: &mut Tx,
    key: &SequenceKey,
) -> Result<SequenceCounter, Error<Tx::Err>>
where
    Tx: CounterTransaction,
{
    if let Some(counter) = tx.lock_counter(key).await.map_err(Error::Store)? {
        return Ok(counter);
    }

    match tx.create_counter(key).await.map_err(Error::Store)? {
        CreateOutcome::Created(counter) => Ok(counter),
        CreateOutcome::Conflict => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%key, "counter created concurrently, locking existing row");
            tx.lock_counter(key)
                .await
                .map_err(Error::Store)?
                .ok_or_else(|| Error::CounterVanished { key: key.clone() })
        }
    }
}
