//! PostgreSQL counter store.
//!
//! Counters live in one table keyed by `(institute_id, academic_year)`:
//!
//! ```sql
//! BEGIN;
//! SELECT ... FROM application_sequences
//!     WHERE institute_id = $1 AND academic_year = $2 FOR UPDATE;
//! -- no row: INSERT ... ON CONFLICT (institute_id, academic_year) DO NOTHING
//! UPDATE application_sequences SET last_number = last_number + 1 ...;
//! COMMIT; -- issued by the caller
//! ```
//!
//! `ON CONFLICT DO NOTHING` waits for a concurrent uncommitted insert of the
//! same key to finish. If that insert commits, no row is returned and the
//! allocator locks the committed row instead; if it rolls back, this insert
//! goes through. Either way the transaction is never aborted by a unique
//! violation.

use core::future::Future;
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    AcademicYear, CounterTransaction, CreateOutcome, Institute, InstituteId, InstituteLookup,
    SequenceCounter, SequenceKey, TransactionStatus,
};

/// Name of the counter table.
pub const COUNTER_TABLE: &str = "application_sequences";

/// Idempotent DDL for the counter table.
///
/// The unique constraint doubles as the lookup index for
/// `(institute_id, academic_year)`.
pub const COUNTER_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS application_sequences (
    id            UUID        PRIMARY KEY,
    institute_id  UUID        NOT NULL,
    academic_year TEXT        NOT NULL CHECK (btrim(academic_year) <> ''),
    last_number   BIGINT      NOT NULL DEFAULT 0 CHECK (last_number >= 0),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_application_sequences_institute_year UNIQUE (institute_id, academic_year)
)
"#;

/// Default query used by [`PgInstituteLookup`].
pub const DEFAULT_INSTITUTE_QUERY: &str = "SELECT institute_code FROM institutes WHERE id = $1";

// SQLSTATE `in_failed_sql_transaction`.
const IN_FAILED_TRANSACTION: &str = "25P02";

const LOCK_COUNTER: &str = r#"
SELECT id, institute_id, academic_year, last_number, created_at, updated_at
FROM application_sequences
WHERE institute_id = $1 AND academic_year = $2
FOR UPDATE
"#;

const READ_COUNTER: &str = r#"
SELECT id, institute_id, academic_year, last_number, created_at, updated_at
FROM application_sequences
WHERE institute_id = $1 AND academic_year = $2
"#;

const CREATE_COUNTER: &str = r#"
INSERT INTO application_sequences
    (id, institute_id, academic_year, last_number, created_at, updated_at)
VALUES ($1, $2, $3, 0, now(), now())
ON CONFLICT (institute_id, academic_year) DO NOTHING
RETURNING id, institute_id, academic_year, last_number, created_at, updated_at
"#;

const INCREMENT_COUNTER: &str = r#"
UPDATE application_sequences
SET last_number = last_number + 1,
    updated_at = now()
WHERE id = $1
RETURNING id, institute_id, academic_year, last_number, created_at, updated_at
"#;

type CounterRow = (Uuid, Uuid, String, i64, DateTime<Utc>, DateTime<Utc>);

fn decode(row: CounterRow) -> Result<SequenceCounter, sqlx::Error> {
    let (id, institute_id, academic_year, last_number, created_at, updated_at) = row;
    let academic_year =
        AcademicYear::new(academic_year).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    let last_number =
        u64::try_from(last_number).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    Ok(SequenceCounter {
        id,
        institute_id: institute_id.into(),
        academic_year,
        last_number,
        created_at,
        updated_at,
    })
}

/// Creates the counter table if it does not exist.
///
/// # Errors
///
/// Returns any error reported by the database.
pub async fn ensure_schema<'e, E>(executor: E) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::raw_sql(COUNTER_TABLE_DDL).execute(executor).await?;
    Ok(())
}

impl CounterTransaction for Transaction<'_, Postgres> {
    type Err = sqlx::Error;

    fn status(&mut self) -> impl Future<Output = Result<TransactionStatus, Self::Err>> + Send {
        async move {
            match sqlx::query("SELECT 1").execute(&mut **self).await {
                Ok(_) => Ok(TransactionStatus::Active),
                Err(sqlx::Error::Database(err))
                    if err.code().as_deref() == Some(IN_FAILED_TRANSACTION) =>
                {
                    Ok(TransactionStatus::Aborted)
                }
                Err(err) => Err(err),
            }
        }
    }

    fn lock_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        async move {
            let row: Option<CounterRow> = sqlx::query_as(LOCK_COUNTER)
                .bind(*key.institute_id().as_uuid())
                .bind(key.academic_year().as_str())
                .fetch_optional(&mut **self)
                .await?;
            row.map(decode).transpose()
        }
    }

    fn create_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<CreateOutcome, Self::Err>> + Send {
        async move {
            let row: Option<CounterRow> = sqlx::query_as(CREATE_COUNTER)
                .bind(Uuid::new_v4())
                .bind(*key.institute_id().as_uuid())
                .bind(key.academic_year().as_str())
                .fetch_optional(&mut **self)
                .await?;
            match row {
                Some(row) => decode(row).map(CreateOutcome::Created),
                None => Ok(CreateOutcome::Conflict),
            }
        }
    }

    fn increment(
        &mut self,
        counter: &SequenceCounter,
    ) -> impl Future<Output = Result<SequenceCounter, Self::Err>> + Send {
        async move {
            let row: CounterRow = sqlx::query_as(INCREMENT_COUNTER)
                .bind(counter.id)
                .fetch_one(&mut **self)
                .await?;
            decode(row)
        }
    }

    fn read_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        async move {
            let row: Option<CounterRow> = sqlx::query_as(READ_COUNTER)
                .bind(*key.institute_id().as_uuid())
                .bind(key.academic_year().as_str())
                .fetch_optional(&mut **self)
                .await?;
            row.map(decode).transpose()
        }
    }
}

/// Resolves institutes with a single-parameter query run inside the caller's
/// transaction.
///
/// The query receives the institute id as `$1` and must return one nullable
/// text column holding the institute code. No row means the institute does
/// not exist.
#[derive(Clone, Debug)]
pub struct PgInstituteLookup {
    query: Cow<'static, str>,
}

impl PgInstituteLookup {
    /// Uses [`DEFAULT_INSTITUTE_QUERY`].
    pub const fn new() -> Self {
        Self {
            query: Cow::Borrowed(DEFAULT_INSTITUTE_QUERY),
        }
    }

    pub fn with_query(query: impl Into<Cow<'static, str>>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl Default for PgInstituteLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl<'c> InstituteLookup<Transaction<'c, Postgres>> for PgInstituteLookup {
    fn find_institute(
        &self,
        tx: &mut Transaction<'c, Postgres>,
        id: InstituteId,
    ) -> impl Future<Output = Result<Option<Institute>, sqlx::Error>> + Send {
        async move {
            let row: Option<(Option<String>,)> = sqlx::query_as(self.query())
                .bind(*id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
            Ok(row.map(|(code,)| Institute { id, code }))
        }
    }
}
