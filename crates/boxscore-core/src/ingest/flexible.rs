// Flexible profile: one flat `batting_events` row per input record.
//
// The input shape is not trusted, so every field is looked up through a list
// of candidate names (any case). The date is the only mandatory field.

use std::fmt;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::ingest::IngestError;
use crate::resolve::{resolve_date, resolve_int, resolve_opt_text, resolve_value, Record};
use crate::schema::Profile;

const DATE_KEYS: &[&str] = &["date", "gameDate", "game_date"];
const GAME_ID_KEYS: &[&str] = &["gameId", "game_id", "gid", "gameNo", "game_no"];
const PLAYER_ID_KEYS: &[&str] = &["playerId", "player_id", "pid"];
const PLAYER_NAME_KEYS: &[&str] = &["playerName", "player_name", "name", "player"];
const TEAM_KEYS: &[&str] = &["team", "teamName", "team_name"];
const AB_KEYS: &[&str] = &["ab", "at_bats", "atBats"];
const H_KEYS: &[&str] = &["h", "hits"];
const HR_KEYS: &[&str] = &["hr", "homeRuns", "home_runs"];
const BB_KEYS: &[&str] = &["bb", "walks"];

/// Keys under which a wrapper object may hold the record array.
pub const WRAPPER_KEYS: &[&str] = &["data", "records", "events", "items", "rows", "results"];

/// One stored flexible-profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattingEvent {
    pub date: NaiveDate,
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub team: Option<String>,
    pub ab: i64,
    pub h: i64,
    pub hr: i64,
    pub bb: i64,
}

impl BattingEvent {
    /// `None` when no candidate date field parses.
    pub fn from_record(record: &Record) -> Option<Self> {
        let date = resolve_date(record, DATE_KEYS)?;
        Some(Self {
            date,
            game_id: resolve_opt_text(record, GAME_ID_KEYS),
            player_id: resolve_opt_text(record, PLAYER_ID_KEYS),
            player_name: resolve_opt_text(record, PLAYER_NAME_KEYS),
            team: resolve_opt_text(record, TEAM_KEYS),
            ab: resolve_int(record, AB_KEYS),
            h: resolve_int(record, H_KEYS),
            hr: resolve_int(record, HR_KEYS),
            bb: resolve_int(record, BB_KEYS),
        })
    }
}

/// Counts from one flexible-profile load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlexibleLoadSummary {
    pub events: usize,
    /// Records that were not JSON objects.
    pub skipped_records: usize,
    /// Records dropped because no date field parsed.
    pub bad_dates: usize,
}

impl fmt::Display for FlexibleLoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batting events:")?;
        writeln!(f, "  - Loaded: {}", self.events)?;
        writeln!(f, "  - Skipped records: {}", self.skipped_records)?;
        write!(f, "  - Unparsable dates: {}", self.bad_dates)
    }
}

/// The event records of a flexible document: the root array, or the array
/// held by a wrapper object under one of [`WRAPPER_KEYS`].
pub fn event_records(doc: &Value) -> Result<&[Value], IngestError> {
    let records = match doc {
        Value::Array(items) => Some(items),
        Value::Object(wrapper) => WRAPPER_KEYS
            .iter()
            .find_map(|key| match resolve_value(wrapper, &[*key]) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    };
    records.map(Vec::as_slice).ok_or(IngestError::NotAnArray {
        profile: Profile::Flexible,
    })
}

fn insert_event(conn: &Connection, event: &BattingEvent) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO batting_events
            (date, game_id, player_id, player_name, team, ab, h, hr, bb)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            event.date.format("%Y-%m-%d").to_string(),
            event.game_id,
            event.player_id,
            event.player_name,
            event.team,
            event.ab,
            event.h,
            event.hr,
            event.bb,
        ])
    })
    .context("failed to insert batting event")?;
    Ok(())
}

/// Rebuild `batting_events` from `records`.
pub fn load(conn: &Connection, records: &[Value]) -> Result<FlexibleLoadSummary> {
    conn.execute("DELETE FROM batting_events", [])
        .context("failed to clear batting_events")?;

    let mut summary = FlexibleLoadSummary::default();
    for (index, value) in records.iter().enumerate() {
        let Some(record) = value.as_object() else {
            debug!("skipping event record #{index}: not an object");
            summary.skipped_records += 1;
            continue;
        };
        let Some(event) = BattingEvent::from_record(record) else {
            debug!("dropping event record #{index}: no parsable date");
            summary.bad_dates += 1;
            continue;
        };
        insert_event(conn, &event)?;
        summary.events += 1;
    }

    info!(
        "batting events: {} loaded, {} skipped, {} bad dates",
        summary.events, summary.skipped_records, summary.bad_dates
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open(":memory:", Profile::Flexible).expect("in-memory database should open")
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn event_from_mixed_case_keys() {
        let event = BattingEvent::from_record(&record(json!({
            "date": "2024/04/08", "player_name": "Test", "AB": 4, "H": 2, "HR": 1, "BB": 0
        })))
        .unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 4, 8).unwrap());
        assert_eq!(event.player_name.as_deref(), Some("Test"));
        assert_eq!((event.ab, event.h, event.hr, event.bb), (4, 2, 1, 0));
        assert_eq!(event.game_id, None);
        assert_eq!(event.team, None);
    }

    #[test]
    fn event_alternate_names() {
        let event = BattingEvent::from_record(&record(json!({
            "GameDate": 20240512, "GID": 88, "PID": "A123", "TeamName": "Uni-Lions",
            "atBats": "3", "hits": "1", "homeRuns": 0, "walks": 2
        })))
        .unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
        assert_eq!(event.game_id.as_deref(), Some("88"));
        assert_eq!(event.player_id.as_deref(), Some("A123"));
        assert_eq!(event.team.as_deref(), Some("Uni-Lions"));
        assert_eq!((event.ab, event.h, event.hr, event.bb), (3, 1, 0, 2));
    }

    #[test]
    fn null_date_does_not_hide_case_variant() {
        let event = BattingEvent::from_record(&record(json!({
            "date": null, "Date": "2024-04-01", "AB": 3
        })))
        .unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(event.ab, 3);
    }

    #[test]
    fn event_requires_date() {
        assert!(BattingEvent::from_record(&record(json!({"date": "not-a-date", "AB": 4}))).is_none());
        assert!(BattingEvent::from_record(&record(json!({"AB": 4}))).is_none());
    }

    #[test]
    fn event_records_accepts_wrappers() {
        assert_eq!(event_records(&json!([{}, {}])).unwrap().len(), 2);
        assert_eq!(event_records(&json!({"Data": [{}]})).unwrap().len(), 1);
        assert_eq!(
            event_records(&json!({"meta": {}, "results": [{}, {}, {}]})).unwrap().len(),
            3
        );
        assert!(matches!(
            event_records(&json!({"payload": []})),
            Err(IngestError::NotAnArray {
                profile: Profile::Flexible
            })
        ));
        assert!(event_records(&json!("text")).is_err());
    }

    #[test]
    fn load_normalizes_dates_and_drops_bad_ones() {
        let db = test_db();
        let records = json!([
            {"date": "2024/04/08", "player_name": "Test", "AB": 4, "H": 2, "HR": 1, "BB": 0},
            {"date": "not-a-date", "player_name": "Nope", "AB": 3},
            "stray"
        ]);
        let summary = {
            let conn = db.conn();
            load(&conn, records.as_array().unwrap()).unwrap()
        };
        assert_eq!(
            summary,
            FlexibleLoadSummary {
                events: 1,
                skipped_records: 1,
                bad_dates: 1
            }
        );

        let events = db.batting_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date.to_string(), "2024-04-08");
        assert_eq!((events[0].ab, events[0].h, events[0].hr, events[0].bb), (4, 2, 1, 0));
    }

    #[test]
    fn reload_rebuilds_table() {
        let db = test_db();
        let records = json!([{"date": "2024-04-01", "AB": 1}, {"date": "2024-04-02", "AB": 2}]);
        for _ in 0..2 {
            let conn = db.conn();
            load(&conn, records.as_array().unwrap()).unwrap();
        }
        assert_eq!(db.table_count("batting_events").unwrap(), 2);
    }
}
