use chrono::{DateTime, Utc};

/// A source of wall-clock timestamps for the audit columns of a counter.
///
/// This abstraction allows you to plug in the system clock or a fixed clock
/// in tests. Stores backed by a database use the database clock instead.
///
/// # Example
///
/// ```
/// use appnum::TimeSource;
/// use chrono::{DateTime, TimeZone, Utc};
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn now(&self) -> DateTime<Utc> {
///         Utc.timestamp_opt(1_767_225_600, 0).unwrap()
///     }
/// }
///
/// assert_eq!(FixedTime.now().timestamp(), 1_767_225_600);
/// ```
pub trait TimeSource {
    /// Returns the current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
