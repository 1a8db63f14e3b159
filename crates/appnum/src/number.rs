use core::{fmt, str::FromStr};

use crate::AcademicYear;

/// Minimum number of digits in the sequential part of an application number.
///
/// Shorter numbers are zero-padded. Longer numbers are rendered in full, so
/// the 100000th application of a year reads `...-100000`.
pub const DEFAULT_PAD_WIDTH: usize = 5;

/// A human-readable application number such as `PGC-2026-00001`.
///
/// Rendered as `{institute_code}-{academic_year}-{sequence}` where the
/// sequence is zero-padded to `width` digits and never truncated.
///
/// # Example
///
/// ```
/// use appnum::{AcademicYear, ApplicationNumber};
///
/// let year = AcademicYear::new("2026").unwrap();
/// let number = ApplicationNumber::new("GCU", year, 847);
/// assert_eq!(number.to_string(), "GCU-2026-00847");
///
/// let parsed: ApplicationNumber = "GCU-2026-00847".parse().unwrap();
/// assert_eq!(parsed, number);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApplicationNumber {
    institute_code: String,
    academic_year: AcademicYear,
    sequence: u64,
    width: usize,
}

impl ApplicationNumber {
    /// Builds a number padded to [`DEFAULT_PAD_WIDTH`].
    pub fn new(
        institute_code: impl Into<String>,
        academic_year: AcademicYear,
        sequence: u64,
    ) -> Self {
        Self::with_width(institute_code, academic_year, sequence, DEFAULT_PAD_WIDTH)
    }

    pub fn with_width(
        institute_code: impl Into<String>,
        academic_year: AcademicYear,
        sequence: u64,
        width: usize,
    ) -> Self {
        Self {
            institute_code: institute_code.into(),
            academic_year,
            sequence,
            width,
        }
    }

    pub fn institute_code(&self) -> &str {
        &self.institute_code
    }

    pub const fn academic_year(&self) -> &AcademicYear {
        &self.academic_year
    }

    /// The 1-based position of this number within its sequence.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn width(&self) -> usize {
        self.width
    }
}

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.institute_code,
            self.academic_year,
            self.sequence,
            width = self.width
        )
    }
}

/// Errors from parsing an [`ApplicationNumber`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseNumberError {
    /// The input does not have the `CODE-YEAR-SEQUENCE` shape.
    #[error("expected CODE-YEAR-SEQUENCE, got {0:?}")]
    Malformed(String),

    /// The sequential part is not a decimal number.
    #[error("invalid sequence {0:?}")]
    InvalidSequence(String),
}

impl FromStr for ApplicationNumber {
    type Err = ParseNumberError;

    /// Parses a rendered number.
    ///
    /// The institute code ends at the first `-` and the sequence starts after
    /// the last one, so academic years like `2026-27` survive. The width is
    /// taken from the digits present, which makes rendering the parsed value
    /// reproduce the input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseNumberError::Malformed(s.to_owned());

        let (head, digits) = s.rsplit_once('-').ok_or_else(malformed)?;
        let (code, year) = head.split_once('-').ok_or_else(malformed)?;
        if code.is_empty() {
            return Err(malformed());
        }
        let academic_year = AcademicYear::new(year).map_err(|_| malformed())?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseNumberError::InvalidSequence(digits.to_owned()));
        }
        let sequence = digits
            .parse()
            .map_err(|_| ParseNumberError::InvalidSequence(digits.to_owned()))?;

        Ok(Self::with_width(code, academic_year, sequence, digits.len()))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ApplicationNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ApplicationNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
