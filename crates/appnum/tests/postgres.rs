//! Integration tests against a live PostgreSQL.
//!
//! Set `DATABASE_URL` to run them; without it every test returns early.

use appnum::{
    CounterTransaction, CreateOutcome, Error, Institute, InstituteId, PgInstituteLookup,
    PreconditionError, SequenceAllocator, SequenceCounter, SequenceKey, StaticDirectory,
    TransactionStatus, ensure_schema,
};
use core::future::Future;
use futures::future::join_all;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;

const INSTITUTES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS appnum_test_institutes (
    id             UUID PRIMARY KEY,
    institute_code TEXT
)
"#;

const INSTITUTE_QUERY: &str = "SELECT institute_code FROM appnum_test_institutes WHERE id = $1";

async fn pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(40)
        .connect(&url)
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    sqlx::raw_sql(INSTITUTES_DDL).execute(&pool).await.unwrap();
    Some(pool)
}

async fn institute(pool: &PgPool, code: Option<&str>) -> InstituteId {
    let id = InstituteId::new_v4();
    sqlx::query("INSERT INTO appnum_test_institutes (id, institute_code) VALUES ($1, $2)")
        .bind(*id.as_uuid())
        .bind(code)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn allocator() -> Arc<SequenceAllocator<PgInstituteLookup>> {
    Arc::new(SequenceAllocator::new(PgInstituteLookup::with_query(
        INSTITUTE_QUERY,
    )))
}

async fn last_number(pool: &PgPool, institute: InstituteId, year: &str) -> u64 {
    let mut tx = pool.begin().await.unwrap();
    let last = allocator()
        .last_issued(&mut tx, institute, year)
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    last
}

#[tokio::test]
async fn issues_padded_numbers() {
    let Some(pool) = pool().await else { return };
    let pgc = institute(&pool, Some("PGC")).await;
    let allocator = allocator();

    for expected in ["PGC-2026-00001", "PGC-2026-00002"] {
        let mut tx = pool.begin().await.unwrap();
        let number = allocator.allocate(&mut tx, pgc, "2026").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(number.to_string(), expected);
    }

    let mut tx = pool.begin().await.unwrap();
    let number = allocator.allocate(&mut tx, pgc, "2026-27").await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(number.to_string(), "PGC-2026-27-00001");

    let mut tx = pool.begin().await.unwrap();
    let last = allocator
        .last_issued_number(&mut tx, pgc, "2026")
        .await
        .unwrap()
        .map(|number| number.to_string());
    assert_eq!(last.as_deref(), Some("PGC-2026-00002"));
    assert_eq!(
        allocator.last_issued_number(&mut tx, pgc, "2030").await.unwrap(),
        None
    );
    tx.rollback().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_are_gap_free() {
    const N: u64 = 32;
    let Some(pool) = pool().await else { return };
    let gcu = institute(&pool, Some("GCU")).await;
    let allocator = allocator();

    let tasks = (0..N).map(|_| {
        let pool = pool.clone();
        let allocator = allocator.clone();
        tokio::spawn(async move {
            let mut tx = pool.begin().await.unwrap();
            let number = allocator.allocate(&mut tx, gcu, "2026").await.unwrap();
            tx.commit().await.unwrap();
            number.sequence()
        })
    });

    let mut issued: Vec<u64> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    issued.sort_unstable();
    assert_eq!(issued, (1..=N).collect::<Vec<_>>());
    assert_eq!(last_number(&pool, gcu, "2026").await, N);
}

#[tokio::test]
async fn rollback_returns_the_number() {
    let Some(pool) = pool().await else { return };
    let pgc = institute(&pool, Some("PGC")).await;
    let allocator = allocator();

    let mut tx = pool.begin().await.unwrap();
    allocator.allocate(&mut tx, pgc, "2026").await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let abandoned = allocator.allocate(&mut tx, pgc, "2026").await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(abandoned.sequence(), 2);

    let mut tx = pool.begin().await.unwrap();
    let next = allocator.allocate(&mut tx, pgc, "2026").await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(next.to_string(), "PGC-2026-00002");
}

#[tokio::test]
async fn preconditions_are_checked_before_writing() {
    let Some(pool) = pool().await else { return };
    let no_code = institute(&pool, None).await;
    let blank = institute(&pool, Some("")).await;
    let hyphenated = institute(&pool, Some("AB-C")).await;
    let unknown = InstituteId::new_v4();
    let allocator = allocator();

    let mut tx = pool.begin().await.unwrap();
    assert!(matches!(
        allocator.allocate(&mut tx, unknown, "2026").await,
        Err(Error::Precondition(PreconditionError::InstituteNotFound(_)))
    ));
    assert!(matches!(
        allocator.allocate(&mut tx, no_code, "2026").await,
        Err(Error::Precondition(PreconditionError::MissingInstituteCode(_)))
    ));
    assert!(matches!(
        allocator.allocate(&mut tx, blank, "2026").await,
        Err(Error::Precondition(PreconditionError::MissingInstituteCode(_)))
    ));
    assert!(matches!(
        allocator.allocate(&mut tx, hyphenated, "2026").await,
        Err(Error::Precondition(PreconditionError::InvalidInstituteCode { .. }))
    ));
    tx.commit().await.unwrap();

    assert_eq!(last_number(&pool, hyphenated, "2026").await, 0);
    assert_eq!(last_number(&pool, no_code, "2026").await, 0);
    assert_eq!(last_number(&pool, blank, "2026").await, 0);
}

#[tokio::test]
async fn aborted_transaction_is_reported() {
    let Some(pool) = pool().await else { return };
    let pgc = institute(&pool, Some("PGC")).await;
    let allocator = allocator();

    let mut tx = pool.begin().await.unwrap();
    assert!(sqlx::query("SELECT 1 / 0").execute(&mut *tx).await.is_err());
    assert_eq!(tx.status().await.unwrap(), TransactionStatus::Aborted);
    assert!(matches!(
        allocator.allocate(&mut tx, pgc, "2026").await,
        Err(Error::TransactionState {
            status: TransactionStatus::Aborted
        })
    ));
    tx.rollback().await.unwrap();
}

/// Pauses on a barrier the first time no counter row is found so both
/// transactions attempt the insert.
struct Racing {
    inner: Transaction<'static, Postgres>,
    barrier: Arc<Barrier>,
    waited: bool,
}

impl CounterTransaction for Racing {
    type Err = sqlx::Error;

    fn status(&mut self) -> impl Future<Output = Result<TransactionStatus, Self::Err>> + Send {
        self.inner.status()
    }

    fn lock_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        async move {
            let found = self.inner.lock_counter(key).await?;
            if found.is_none() && !self.waited {
                self.waited = true;
                self.barrier.wait().await;
            }
            Ok(found)
        }
    }

    fn create_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<CreateOutcome, Self::Err>> + Send {
        self.inner.create_counter(key)
    }

    fn increment(
        &mut self,
        counter: &SequenceCounter,
    ) -> impl Future<Output = Result<SequenceCounter, Self::Err>> + Send {
        self.inner.increment(counter)
    }

    fn read_counter(
        &mut self,
        key: &SequenceKey,
    ) -> impl Future<Output = Result<Option<SequenceCounter>, Self::Err>> + Send {
        self.inner.read_counter(key)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_first_creation_yields_one_and_two() {
    let Some(pool) = pool().await else { return };
    let id = InstituteId::new_v4();
    let directory: StaticDirectory = [Institute::new(id, "NEW")].into_iter().collect();
    let allocator = Arc::new(SequenceAllocator::new(directory));
    let barrier = Arc::new(Barrier::new(2));

    let tasks = (0..2).map(|_| {
        let pool = pool.clone();
        let allocator = allocator.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            let mut tx = Racing {
                inner: pool.begin().await.unwrap(),
                barrier,
                waited: false,
            };
            let number = allocator.allocate(&mut tx, id, "2026").await.unwrap();
            tx.inner.commit().await.unwrap();
            number.sequence()
        })
    });

    let issued: HashSet<u64> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(issued, HashSet::from([1, 2]));

    let rows: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM application_sequences WHERE institute_id = $1",
    )
    .bind(*id.as_uuid())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows.0, 1);
}
