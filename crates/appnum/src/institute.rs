use core::future::{self, Future};
use std::{collections::HashMap, sync::Arc};

use crate::{CounterTransaction, InstituteId, PreconditionError, Result};

/// The slice of an institute record the allocator needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Institute {
    pub id: InstituteId,
    /// Short prefix for application numbers, e.g. `"PGC"`. `None` when the
    /// institute has not been configured with one.
    pub code: Option<String>,
}

impl Institute {
    pub fn new(id: InstituteId, code: impl Into<String>) -> Self {
        Self {
            id,
            code: Some(code.into()),
        }
    }

    /// Returns the configured code.
    ///
    /// # Errors
    ///
    /// - [`PreconditionError::MissingInstituteCode`] if the code is absent,
    ///   empty, or whitespace.
    /// - [`PreconditionError::InvalidInstituteCode`] if the code contains
    ///   `-`, the separator of rendered numbers.
    pub fn require_code(&self) -> Result<&str, PreconditionError> {
        match self.code.as_deref() {
            Some(code) if code.trim().is_empty() => {
                Err(PreconditionError::MissingInstituteCode(self.id))
            }
            Some(code) if code.contains('-') => Err(PreconditionError::InvalidInstituteCode {
                id: self.id,
                code: code.to_owned(),
            }),
            Some(code) => Ok(code),
            None => Err(PreconditionError::MissingInstituteCode(self.id)),
        }
    }
}

/// Resolves institutes for the allocator.
///
/// The lookup receives the caller's transaction so that database-backed
/// implementations read the institute inside the same transaction as the
/// counter.
pub trait InstituteLookup<Tx>: Sync
where
    Tx: CounterTransaction,
{
    /// Finds an institute by id, returning `None` if it does not exist.
    fn find_institute(
        &self,
        tx: &mut Tx,
        id: InstituteId,
    ) -> impl Future<Output = Result<Option<Institute>, Tx::Err>> + Send;
}

/// An in-process institute directory, usable with any transaction type.
///
/// Clones share the same directory.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    institutes: Arc<parking_lot::RwLock<HashMap<InstituteId, Institute>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an institute.
    pub fn insert(&self, institute: Institute) {
        self.institutes.write().insert(institute.id, institute);
    }

    pub fn remove(&self, id: InstituteId) -> Option<Institute> {
        self.institutes.write().remove(&id)
    }

    pub fn get(&self, id: InstituteId) -> Option<Institute> {
        self.institutes.read().get(&id).cloned()
    }
}

impl FromIterator<Institute> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = Institute>>(iter: I) -> Self {
        let directory = Self::new();
        for institute in iter {
            directory.insert(institute);
        }
        directory
    }
}

impl<Tx> InstituteLookup<Tx> for StaticDirectory
where
    Tx: CounterTransaction,
{
    fn find_institute(
        &self,
        _tx: &mut Tx,
        id: InstituteId,
    ) -> impl Future<Output = Result<Option<Institute>, Tx::Err>> + Send {
        future::ready(Ok(self.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_code_rejects_missing_and_blank_codes() {
        let id = InstituteId::new_v4();
        assert_eq!(Institute::new(id, "PGC").require_code(), Ok("PGC"));

        let missing = Institute { id, code: None };
        assert_eq!(
            missing.require_code(),
            Err(PreconditionError::MissingInstituteCode(id))
        );

        let blank = Institute::new(id, "  ");
        assert_eq!(
            blank.require_code(),
            Err(PreconditionError::MissingInstituteCode(id))
        );
    }

    #[test]
    fn require_code_rejects_the_number_separator() {
        let id = InstituteId::new_v4();
        assert_eq!(
            Institute::new(id, "AB-C").require_code(),
            Err(PreconditionError::InvalidInstituteCode {
                id,
                code: "AB-C".into()
            })
        );
        assert_eq!(Institute::new(id, "AB_C").require_code(), Ok("AB_C"));
    }

    #[test]
    fn directory_clones_share_entries() {
        let directory = StaticDirectory::new();
        let clone = directory.clone();
        let id = InstituteId::new_v4();

        directory.insert(Institute::new(id, "GCU"));
        assert_eq!(clone.get(id), Some(Institute::new(id, "GCU")));

        assert!(clone.remove(id).is_some());
        assert_eq!(directory.get(id), None);
    }
}
