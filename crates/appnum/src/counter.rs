use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{AcademicYear, InstituteId, SequenceKey};

/// The largest `last_number` a counter may hold.
///
/// Counters are persisted as signed 64-bit integers.
pub const MAX_LAST_NUMBER: u64 = i64::MAX as u64;

/// One persisted counter row per institute and academic year.
///
/// `last_number` is the count of numbers issued so far. It starts at `0` when
/// the row is created and only ever grows by one per committed allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceCounter {
    pub id: Uuid,
    pub institute_id: InstituteId,
    pub academic_year: AcademicYear,
    pub last_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SequenceCounter {
    /// A counter that has not issued any number yet.
    pub fn fresh(key: &SequenceKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            institute_id: key.institute_id(),
            academic_year: key.academic_year().clone(),
            last_number: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SequenceKey {
        SequenceKey::new(self.institute_id, self.academic_year.clone())
    }

    /// Returns `true` if one more number can be issued.
    pub const fn has_room(&self) -> bool {
        self.last_number < MAX_LAST_NUMBER
    }
}
