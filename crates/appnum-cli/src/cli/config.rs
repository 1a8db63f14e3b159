use anyhow::bail;
use appnum::{AcademicYear, DEFAULT_INSTITUTE_QUERY, DEFAULT_PAD_WIDTH, InstituteId};
use clap::{Parser, Subcommand};

/// `u64::MAX` has 20 digits; wider padding is never useful.
const MAX_PAD_WIDTH: usize = 20;

/// Command-line interface of the `appnum-cli` binary.
///
/// Every global option can also be set through an environment variable or a
/// `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "appnum-cli",
    version,
    about = "Manage per-institute application number counters"
)]
pub struct CliArgs {
    /// PostgreSQL connection string.
    ///
    /// Required by every command except `schema` without `--apply`.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Maximum number of pooled database connections.
    ///
    /// Environment variable: `MAX_CONNECTIONS`
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 4)]
    pub max_connections: u32,

    /// Minimum digits of the sequential part. Longer numbers are never
    /// truncated.
    ///
    /// Environment variable: `PAD_WIDTH`
    #[arg(long, env = "PAD_WIDTH", default_value_t = DEFAULT_PAD_WIDTH)]
    pub pad_width: usize,

    /// Query resolving an institute id (`$1`) to its code.
    ///
    /// Must return a single nullable text column; no row means the institute
    /// does not exist.
    ///
    /// Environment variable: `INSTITUTE_QUERY`
    #[arg(long, env = "INSTITUTE_QUERY", default_value_t = String::from(DEFAULT_INSTITUTE_QUERY))]
    pub institute_query: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the counter table DDL, or create the table with `--apply`.
    Schema {
        /// Run the DDL against `DATABASE_URL` instead of printing it.
        #[arg(long)]
        apply: bool,
    },

    /// Issue application numbers, one transaction per number.
    Allocate {
        /// Institute id (UUID).
        #[arg(long)]
        institute: InstituteId,

        /// Academic year label, used verbatim (e.g. `2026` or `2026-27`).
        #[arg(long)]
        year: String,

        /// How many numbers to issue.
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Roll every transaction back instead of committing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print how many numbers have been issued for a key.
    Show {
        /// Institute id (UUID).
        #[arg(long)]
        institute: InstituteId,

        /// Academic year label.
        #[arg(long)]
        year: String,
    },
}

/// Validated runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub pad_width: usize,
    pub institute_query: String,
    pub command: Command,
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_connections == 0 {
            bail!("MAX_CONNECTIONS must be greater than 0");
        }

        if args.pad_width == 0 || args.pad_width > MAX_PAD_WIDTH {
            bail!(
                "PAD_WIDTH ({}) must be between 1 and {}",
                args.pad_width,
                MAX_PAD_WIDTH
            );
        }

        if !args.institute_query.contains("$1") {
            bail!("INSTITUTE_QUERY must bind the institute id as $1");
        }

        match &args.command {
            Command::Allocate { year, count, .. } => {
                AcademicYear::new(year.as_str())?;
                if *count == 0 {
                    bail!("--count must be greater than 0");
                }
            }
            Command::Show { year, .. } => {
                AcademicYear::new(year.as_str())?;
            }
            Command::Schema { .. } => {}
        }

        Ok(Self {
            database_url: args.database_url,
            max_connections: args.max_connections,
            pad_width: args.pad_width,
            institute_query: args.institute_query,
            command: args.command,
        })
    }
}

// Hand-written so the connection string (and its password) never ends up in
// logs.
impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("max_connections", &self.max_connections)
            .field("pad_width", &self.pad_width)
            .field("institute_query", &self.institute_query)
            .field("command", &self.command)
            .finish()
    }
}
