use core::{fmt, future::Future};

use crate::{SequenceCounter, SequenceKey};

/// Whether a transaction handle can still run statements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Statements may run and the transaction may commit.
    Active,
    /// A statement failed; the transaction can only roll back.
    Aborted,
}

/// The result of trying to create a brand-new counter row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This transaction inserted the row with `last_number = 0` and holds its
    /// lock.
    Created(SequenceCounter),
    /// Another transaction created the row first. The caller should lock the
    /// existing row instead.
    Conflict,
}

/// A handle to an open transaction against a store of counter rows.
///
/// Holding a value of this type is the proof that a transaction is open: the
/// allocator never begins, commits, or rolls back, it only runs statements
/// through the handle. Every row lock taken through the handle is held until
/// the owner of the transaction ends it.
///
/// Implementations must uphold select-for-update semantics:
///
/// - [`lock_counter`] blocks while another open transaction holds the row.
/// - [`create_counter`] never produces a second row for a key. If a
///   concurrent transaction is creating the same row, it waits for that
///   transaction to end and reports [`CreateOutcome::Conflict`] if the row
///   was committed.
/// - [`increment`] only touches a row this transaction has locked.
///
/// [`lock_counter`]: CounterTransaction::lock_counter
/// [`create_counter`]: CounterTransaction::create_counter
/// [`increment`]: CounterTransaction::increment
pub trait CounterTransaction: Send {
    /// The error type of the underlying store.
    type Err: fmt::Debug + Send;

    /// Reports whether statements can still run on this transaction.
    fn status(&mut self) -> impl Future<Output = Result<TransactionStatus, Self::Err>> + Send;

    /// Locks the row for `key`, waiting for any other holder to finish.
    ///
    /// Returns `None` if no committed row exists.
    fn lock_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send;

    /// Creates the row for `key` with `last_number = 0`.
    fn create_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<CreateOutcome, Self::Err>> + Send;

    /// Adds one to `last_number` of a locked row and returns the new state.
    fn increment(
        &mut self,
        counter: &SequenceCounter,
    ) -> impl Future<Output = Result<SequenceCounter, Self::Err>> + Send;

    /// Reads the row for `key` without locking it.
    fn read_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send;
}
