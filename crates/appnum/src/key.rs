use core::{fmt, str::FromStr};

use uuid::Uuid;

use crate::{PreconditionError, Result};

/// Identifier of an institute, as owned by the surrounding application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstituteId(Uuid);

impl InstituteId {
    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for InstituteId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for InstituteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for InstituteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// An admissions-cycle label such as `"2026"` or `"2026-27"`.
///
/// The label is kept verbatim. `"2026"` and `"2026-27"` are different
/// sequences even if they name the same cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct AcademicYear(String);

impl AcademicYear {
    /// Validates a label.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError::EmptyAcademicYear`] if the label is empty
    /// or contains only whitespace.
    pub fn new(label: impl Into<String>) -> Result<Self, PreconditionError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(PreconditionError::EmptyAcademicYear);
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AcademicYear {
    type Error = PreconditionError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        Self::new(label)
    }
}

impl TryFrom<&str> for AcademicYear {
    type Error = PreconditionError;

    fn try_from(label: &str) -> Result<Self, Self::Error> {
        Self::new(label)
    }
}

impl From<AcademicYear> for String {
    fn from(year: AcademicYear) -> Self {
        year.0
    }
}

impl AsRef<str> for AcademicYear {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The uniqueness key of a counter: one sequence per institute and academic
/// year.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceKey {
    institute_id: InstituteId,
    academic_year: AcademicYear,
}

impl SequenceKey {
    pub const fn new(institute_id: InstituteId, academic_year: AcademicYear) -> Self {
        Self {
            institute_id,
            academic_year,
        }
    }

    pub const fn institute_id(&self) -> InstituteId {
        self.institute_id
    }

    pub const fn academic_year(&self) -> &AcademicYear {
        &self.academic_year
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.institute_id, self.academic_year)
    }
}
