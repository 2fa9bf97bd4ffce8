// Box-score ETL entry point.
//
// 1. Initialize tracing (stderr; the load report goes to stdout)
// 2. Load config/etl.toml and apply command-line overrides
// 3. Read the input, load it into SQLite in one transaction
// 4. Print the load report

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use boxscore_core::config::{self, Overrides};
use boxscore_core::ingest;
use boxscore_core::schema::Profile;

/// Load a baseball JSON export into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "boxscore-etl")]
#[command(version)]
struct Cli {
    /// JSON document to load (overrides `[etl] input`)
    #[arg(long)]
    input: Option<PathBuf>,

    /// SQLite database to create or update (overrides `[etl] db_path`)
    #[arg(long = "db")]
    db_path: Option<PathBuf>,

    /// Storage profile (overrides `[etl] profile`)
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Directory holding config/etl.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProfileArg {
    Structured,
    Flexible,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Structured => Profile::Structured,
            ProfileArg::Flexible => Profile::Flexible,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let overrides = Overrides {
        input: cli.input,
        db_path: cli.db_path,
        profile: cli.profile.map(Profile::from),
    };
    let config = config::load_config(&cli.config_dir, &overrides)
        .context("failed to load configuration")?;
    info!(
        "Config loaded: input={}, db={}, profile={}",
        config.input.display(),
        config.db_path.display(),
        config.profile
    );

    let report = ingest::run(&config).context("load failed")?;
    println!("{report}");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("boxscore_core=info,boxscore_etl=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
