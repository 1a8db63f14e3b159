use crate::{InstituteId, SequenceKey, TransactionStatus};

/// A result type defaulting to this crate's [`Error`] over an infallible
/// store.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors an allocation can surface.
///
/// The generic parameter `E` is the error type of the backing store (the
/// transaction handle's [`CounterTransaction::Err`]). Store failures are
/// passed through unchanged in [`Error::Store`]; the allocator never retries
/// them.
///
/// A uniqueness conflict while creating a brand-new counter row is *not* an
/// error: it is reported by the store as [`CreateOutcome::Conflict`] and
/// recovered by locking the row the concurrent creator inserted.
///
/// [`CounterTransaction::Err`]: crate::CounterTransaction::Err
/// [`CreateOutcome::Conflict`]: crate::CreateOutcome::Conflict
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E = core::convert::Infallible> {
    /// The caller's input failed validation. No counter row was read or
    /// written.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The transaction handle is not usable, e.g. an earlier statement
    /// failed and the transaction is aborted.
    #[error("allocation requires an active transaction, found {status:?}")]
    TransactionState {
        /// The status reported by the handle.
        status: TransactionStatus,
    },

    /// The counter row could not be locked right after the store reported
    /// that a concurrent transaction created it.
    #[error("counter {key} reported as existing but could not be locked")]
    CounterVanished {
        /// The key whose row went missing.
        key: SequenceKey,
    },

    /// The counter reached the largest value the store can persist.
    #[error("counter {key} is exhausted")]
    Exhausted {
        /// The exhausted key.
        key: SequenceKey,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[source] E),
}

/// Input problems detected before the store is touched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PreconditionError {
    /// No institute exists with this id.
    #[error("institute {0} not found")]
    InstituteNotFound(InstituteId),

    /// The institute exists but has no usable short code.
    #[error("institute {0} has no institute code configured")]
    MissingInstituteCode(InstituteId),

    /// The institute code contains the `-` separator, so numbers rendered
    /// with it could not be parsed back.
    #[error("institute {id} code {code:?} must not contain '-'")]
    InvalidInstituteCode {
        /// The institute carrying the code.
        id: InstituteId,
        /// The rejected code.
        code: String,
    },

    /// The academic year label is empty or whitespace.
    #[error("academic year must not be empty")]
    EmptyAcademicYear,
}

impl<E> Error<E> {
    /// Returns `true` for errors caused by the caller's input rather than the
    /// store.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}
