// Batch load of a JSON export into the relational store.
//
// Pipeline: read and shape-check the document, open the store (schema is
// created outside the transaction), then run every write in one transaction:
// pass 1 fills the dimension tables from all records, pass 2 writes games and
// their box-score and plate-appearance rows. Fatal input problems are caught
// before the store is touched.

pub mod dimensions;
pub mod facts;
pub mod flexible;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::EtlConfig;
use crate::db::Database;
use crate::schema::Profile;

use self::dimensions::DimensionCounts;
use self::facts::FactCounts;
use self::flexible::FlexibleLoadSummary;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Problems with the input document that abort a run before any write.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("input not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("failed to read input {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("input {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("expected a JSON array of records at the root of the {profile} input")]
    NotAnArray { profile: Profile },
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Counts from one structured-profile load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub dimensions: DimensionCounts,
    pub facts: FactCounts,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.dimensions;
        let x = &self.facts;
        writeln!(f, "Master data:")?;
        writeln!(f, "  - Stadiums: {}", d.stadiums)?;
        writeln!(f, "  - Seasons: {}", d.seasons)?;
        writeln!(f, "  - Teams: {}", d.teams)?;
        writeln!(f, "  - Players: {}", d.players)?;
        writeln!(f, "Game data:")?;
        writeln!(f, "  - Games: {}", x.games)?;
        writeln!(f, "  - Batters: {}", x.batters)?;
        writeln!(f, "  - Pitchers: {}", x.pitchers)?;
        write!(f, "  - PA: {}", x.plate_appearances)?;
        if x.skipped_records > 0 {
            write!(f, "\nSkipped records: {}", x.skipped_records)?;
        }
        Ok(())
    }
}

/// Outcome of a full run, per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReport {
    Structured(LoadSummary),
    Flexible(FlexibleLoadSummary),
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReport::Structured(summary) => fmt::Display::fmt(summary, f),
            RunReport::Flexible(summary) => fmt::Display::fmt(summary, f),
        }
    }
}

// ---------------------------------------------------------------------------
// Document handling
// ---------------------------------------------------------------------------

/// Read and parse the whole input document.
pub fn read_document(path: &Path) -> Result<Value, IngestError> {
    if !path.exists() {
        return Err(IngestError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| IngestError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// The game records of a structured document, which must be a root array.
pub fn game_records(doc: &Value) -> Result<&[Value], IngestError> {
    doc.as_array()
        .map(Vec::as_slice)
        .ok_or(IngestError::NotAnArray {
            profile: Profile::Structured,
        })
}

// ---------------------------------------------------------------------------
// Loads
// ---------------------------------------------------------------------------

/// Two-pass structured load in one transaction: dimensions for every record
/// first, then facts. Either everything commits or nothing does.
pub fn load_structured(db: &Database, games: &[Value]) -> Result<LoadSummary> {
    let summary = db.in_transaction(|tx| {
        let dimensions = dimensions::load(tx, games).context("dimension pass failed")?;
        let facts = facts::load(tx, games).context("fact pass failed")?;
        Ok(LoadSummary { dimensions, facts })
    })?;
    info!(
        "structured load complete: {} games, {} batter lines, {} pitcher lines, {} PA",
        summary.facts.games,
        summary.facts.batters,
        summary.facts.pitchers,
        summary.facts.plate_appearances
    );
    Ok(summary)
}

/// Flexible load in one transaction. The event table is rebuilt from scratch.
pub fn load_flexible(db: &Database, records: &[Value]) -> Result<FlexibleLoadSummary> {
    let summary = db.in_transaction(|tx| flexible::load(tx, records))?;
    info!(
        "flexible load complete: {} events, {} skipped",
        summary.events, summary.skipped_records
    );
    Ok(summary)
}

/// Run the configured load end to end.
///
/// The input is read and its root shape checked before the store is opened,
/// so a missing or malformed document never creates or modifies the
/// database.
pub fn run(config: &EtlConfig) -> Result<RunReport> {
    let doc = read_document(&config.input)?;
    info!("read input {}", config.input.display());

    match config.profile {
        Profile::Structured => {
            let games = game_records(&doc)?;
            let db = open_store(config)?;
            Ok(RunReport::Structured(load_structured(&db, games)?))
        }
        Profile::Flexible => {
            let records = flexible::event_records(&doc)?;
            let db = open_store(config)?;
            Ok(RunReport::Flexible(load_flexible(&db, records)?))
        }
    }
}

fn open_store(config: &EtlConfig) -> Result<Database> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
    }
    let path = config.db_path.to_string_lossy();
    let db = Database::open(&path, config.profile)?;
    info!("database ready at {path} ({} profile)", config.profile);
    Ok(db)
}
