// Library root: the ingestion pipeline (JSON export -> SQLite) and the
// batting-metrics read side. The `boxscore-etl` binary and integration tests
// go through this public API.

pub mod config;
pub mod db;
pub mod ingest;
pub mod resolve;
pub mod schema;
pub mod stats;
