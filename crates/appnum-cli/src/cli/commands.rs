use super::config::{Command, Config};
use anyhow::{Context, bail};
use appnum::{
    COUNTER_TABLE, COUNTER_TABLE_DDL, InstituteId, PgInstituteLookup, SequenceAllocator,
    ensure_schema,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub async fn run(config: Config) -> anyhow::Result<()> {
    match config.command.clone() {
        Command::Schema { apply: false } => {
            println!("{}", COUNTER_TABLE_DDL.trim());
            Ok(())
        }
        Command::Schema { apply: true } => {
            let pool = connect(&config).await?;
            ensure_schema(&pool)
                .await
                .with_context(|| format!("failed to create table {COUNTER_TABLE}"))?;
            tracing::info!(table = COUNTER_TABLE, "counter table is ready");
            Ok(())
        }
        Command::Allocate {
            institute,
            year,
            count,
            dry_run,
        } => {
            let pool = connect(&config).await?;
            allocate(&config, &pool, institute, &year, count, dry_run).await
        }
        Command::Show { institute, year } => {
            let pool = connect(&config).await?;
            show(&config, &pool, institute, &year).await
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let Some(url) = config.database_url.as_deref() else {
        bail!("DATABASE_URL is required for this command");
    };
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")
}

fn allocator(config: &Config) -> SequenceAllocator<PgInstituteLookup> {
    SequenceAllocator::new(PgInstituteLookup::with_query(config.institute_query.clone()))
        .with_pad_width(config.pad_width)
}

/// Issues `count` numbers, each in its own transaction, and prints them to
/// stdout in order. With `dry_run` every transaction is rolled back, so the
/// same numbers will be handed out again.
async fn allocate(
    config: &Config,
    pool: &PgPool,
    institute: InstituteId,
    year: &str,
    count: u32,
    dry_run: bool,
) -> anyhow::Result<()> {
    let allocator = allocator(config);

    for _ in 0..count {
        let mut tx = pool.begin().await?;
        let number = match allocator.allocate(&mut tx, institute, year).await {
            Ok(number) => number,
            Err(err) => {
                tx.rollback().await?;
                return Err(err).with_context(|| {
                    format!("failed to allocate a number for {institute}/{year}")
                });
            }
        };

        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }
        tracing::info!(%number, dry_run, "issued");
        println!("{number}");
    }

    Ok(())
}

/// Prints the last number issued for a key, rendered as `allocate` printed
/// it, or a note on stderr when nothing has been issued yet.
async fn show(
    config: &Config,
    pool: &PgPool,
    institute: InstituteId,
    year: &str,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    let last = allocator(config)
        .last_issued_number(&mut tx, institute, year)
        .await
        .with_context(|| format!("failed to read the counter for {institute}/{year}"));
    tx.rollback().await?;

    match last? {
        Some(number) => println!("{number}"),
        None => tracing::info!(%institute, year, "no numbers issued yet"),
    }
    Ok(())
}
