// Pass 1: reference tables (stadiums, seasons, teams, players).
//
// Every game record is scanned before any fact row is written, since fact
// rows refer to these tables by key. Rows are deduplicated by natural key;
// a record without one is skipped.

use anyhow::{bail, Context, Result};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::resolve::{resolve_array, resolve_text};
use crate::schema::Side;

/// Nested arrays whose entries name players.
const PLAYER_BOXES: &[&str] = &["BatterBox", "PitcherBox"];

/// Rows inserted (not refreshed) per reference table during one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionCounts {
    pub stadiums: usize,
    pub seasons: usize,
    pub teams: usize,
    pub players: usize,
}

/// A reference table keyed by natural identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    /// Keyed by name; gets a surrogate id on first insert.
    Stadium,
    /// Season id; attributes: display name.
    Season,
    /// Team id; attributes: display name.
    Team,
    /// Player id; attributes: jersey number, display name.
    Player,
}

impl Dimension {
    fn attribute_count(self) -> usize {
        match self {
            Dimension::Stadium => 0,
            Dimension::Season | Dimension::Team => 1,
            Dimension::Player => 2,
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            Dimension::Stadium => "INSERT OR IGNORE INTO stadiums (name) VALUES (?1)",
            Dimension::Season => "INSERT OR IGNORE INTO seasons (season_id, name) VALUES (?1, ?2)",
            Dimension::Team => "INSERT OR IGNORE INTO teams (team_id, name) VALUES (?1, ?2)",
            Dimension::Player => {
                "INSERT OR IGNORE INTO players (player_id, number, name) VALUES (?1, ?2, ?3)"
            }
        }
    }

    /// Last-write-wins refresh of display attributes. Blank values never
    /// overwrite a stored one.
    fn refresh_sql(self) -> Option<&'static str> {
        match self {
            Dimension::Stadium => None,
            Dimension::Season => Some(
                "UPDATE seasons SET name = ?2
                 WHERE season_id = ?1 AND ?2 <> '' AND name <> ?2",
            ),
            Dimension::Team => Some(
                "UPDATE teams SET name = ?2
                 WHERE team_id = ?1 AND ?2 <> '' AND name <> ?2",
            ),
            Dimension::Player => Some(
                "UPDATE players SET
                    number = CASE WHEN ?2 <> '' THEN ?2 ELSE number END,
                    name   = CASE WHEN ?3 <> '' THEN ?3 ELSE name END
                 WHERE player_id = ?1",
            ),
        }
    }
}

/// Insert `key` into `dimension` if absent, otherwise refresh its display
/// attributes. Returns `true` only when a new row was inserted.
///
/// A blank key is skipped and reported as not inserted.
pub fn upsert(
    conn: &Connection,
    dimension: Dimension,
    key: &str,
    attributes: &[&str],
) -> Result<bool> {
    if attributes.len() != dimension.attribute_count() {
        bail!(
            "{dimension:?} takes {} attributes, got {}",
            dimension.attribute_count(),
            attributes.len()
        );
    }
    let key = key.trim();
    if key.is_empty() {
        return Ok(false);
    }
    let values = || std::iter::once(key).chain(attributes.iter().copied());

    let inserted = conn
        .prepare_cached(dimension.insert_sql())
        .and_then(|mut stmt| stmt.execute(params_from_iter(values())))
        .with_context(|| format!("failed to insert {dimension:?} '{key}'"))?
        > 0;

    if !inserted {
        if let Some(sql) = dimension.refresh_sql() {
            conn.prepare_cached(sql)
                .and_then(|mut stmt| stmt.execute(params_from_iter(values())))
                .with_context(|| format!("failed to refresh {dimension:?} '{key}'"))?;
        }
    }
    Ok(inserted)
}

/// Surrogate id of a stadium, if it has been loaded.
pub fn stadium_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    conn.prepare_cached("SELECT id FROM stadiums WHERE name = ?1")
        .and_then(|mut stmt| stmt.query_row([name], |row| row.get(0)).optional())
        .with_context(|| format!("failed to look up stadium '{name}'"))
}

/// Run the dimension pass over every game record.
pub fn load(conn: &Connection, games: &[Value]) -> Result<DimensionCounts> {
    let mut counts = DimensionCounts::default();

    for game in games {
        let Some(game) = game.as_object() else {
            continue;
        };

        let stadium = resolve_text(game, &["stadium"]);
        if upsert(conn, Dimension::Stadium, &stadium, &[])? {
            counts.stadiums += 1;
        }

        let season_id = resolve_text(game, &["seasonId"]);
        let season = resolve_text(game, &["season"]);
        if upsert(conn, Dimension::Season, &season_id, &[&season])? {
            counts.seasons += 1;
        }

        for side in Side::ALL {
            let team_id = resolve_text(game, &[side.field("TeamId").as_str()]);
            let team = resolve_text(game, &[side.field("Team").as_str()]);
            if upsert(conn, Dimension::Team, &team_id, &[&team])? {
                counts.teams += 1;
            }
        }

        for side in Side::ALL {
            for suffix in PLAYER_BOXES {
                for entry in resolve_array(game, &[side.field(suffix).as_str()]) {
                    let Some(entry) = entry.as_object() else {
                        continue;
                    };
                    let player_id = resolve_text(entry, &["playerId"]);
                    let number = resolve_text(entry, &["playerNumber"]);
                    let name = resolve_text(entry, &["playerName"]);
                    if upsert(conn, Dimension::Player, &player_id, &[&number, &name])? {
                        counts.players += 1;
                    }
                }
            }
        }
    }

    info!(
        "master data: {} stadiums, {} seasons, {} teams, {} players inserted",
        counts.stadiums, counts.seasons, counts.teams, counts.players
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::schema::Profile;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open(":memory:", Profile::Structured).expect("in-memory database should open")
    }

    fn name_of(conn: &Connection, sql: &str, key: &str) -> String {
        conn.query_row(sql, [key], |row| row.get(0)).unwrap()
    }

    #[test]
    fn upsert_inserts_once() {
        let db = test_db();
        let conn = db.conn();
        assert!(upsert(&conn, Dimension::Team, "ACN", &["CTBC Brothers"]).unwrap());
        assert!(!upsert(&conn, Dimension::Team, "ACN", &["CTBC Brothers"]).unwrap());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn upsert_refreshes_display_name() {
        let db = test_db();
        let conn = db.conn();
        upsert(&conn, Dimension::Season, "2024A", &["2024"]).unwrap();
        assert!(!upsert(&conn, Dimension::Season, "2024A", &["2024 Regular Season"]).unwrap());
        assert_eq!(
            name_of(&conn, "SELECT name FROM seasons WHERE season_id = ?1", "2024A"),
            "2024 Regular Season"
        );
    }

    #[test]
    fn blank_attributes_do_not_erase_known_values() {
        let db = test_db();
        let conn = db.conn();
        upsert(&conn, Dimension::Player, "P1", &["52", "Chen Chieh-Hsien"]).unwrap();
        upsert(&conn, Dimension::Player, "P1", &["", ""]).unwrap();
        assert_eq!(
            name_of(&conn, "SELECT name FROM players WHERE player_id = ?1", "P1"),
            "Chen Chieh-Hsien"
        );
        assert_eq!(
            name_of(&conn, "SELECT number FROM players WHERE player_id = ?1", "P1"),
            "52"
        );

        upsert(&conn, Dimension::Player, "P1", &["24", ""]).unwrap();
        assert_eq!(
            name_of(&conn, "SELECT number FROM players WHERE player_id = ?1", "P1"),
            "24"
        );
    }

    #[test]
    fn blank_key_is_skipped() {
        let db = test_db();
        let conn = db.conn();
        assert!(!upsert(&conn, Dimension::Player, "  ", &["", "Nobody"]).unwrap());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn wrong_attribute_count_is_an_error() {
        let db = test_db();
        let conn = db.conn();
        assert!(upsert(&conn, Dimension::Player, "P1", &["only-one"]).is_err());
    }

    #[test]
    fn stadium_gets_stable_surrogate_id() {
        let db = test_db();
        let conn = db.conn();
        upsert(&conn, Dimension::Stadium, "Taipei Dome", &[]).unwrap();
        upsert(&conn, Dimension::Stadium, "Xinzhuang", &[]).unwrap();
        let first = stadium_id(&conn, "Taipei Dome").unwrap().unwrap();
        upsert(&conn, Dimension::Stadium, "Taipei Dome", &[]).unwrap();
        assert_eq!(stadium_id(&conn, "Taipei Dome").unwrap(), Some(first));
        assert_eq!(stadium_id(&conn, "Tianmu").unwrap(), None);
        assert_eq!(stadium_id(&conn, "").unwrap(), None);
    }

    #[test]
    fn load_collects_players_from_all_boxes() {
        let db = test_db();
        let conn = db.conn();
        let games = json!([
            {
                "seasonId": "2024A", "season": "2024", "stadium": "Taipei Dome",
                "awayTeamId": "ACN", "awayTeam": "Brothers",
                "homeTeamId": "ADD", "homeTeam": "Lions",
                "awayBatterBox": [{"playerId": "B1", "playerName": "Away Bat"}],
                "homeBatterBox": [{"playerId": "B2", "playerName": "Home Bat"}, "junk"],
                "awayPitcherBox": [{"playerId": "P1", "playerName": "Away Arm"}],
                "homePitcherBox": [{"playerId": "P2", "playerName": "Home Arm"},
                                   {"playerId": "B2", "playerName": "Home Bat"}]
            },
            "not a game",
            {
                "seasonId": "2024A", "season": "2024", "stadium": "Taipei Dome",
                "awayTeamId": "ADD", "awayTeam": "Lions",
                "homeTeamId": "ACN", "homeTeam": "Brothers",
                "awayBatterBox": [{"playerName": "No Id"}]
            }
        ]);

        let counts = load(&conn, games.as_array().unwrap()).unwrap();
        assert_eq!(
            counts,
            DimensionCounts {
                stadiums: 1,
                seasons: 1,
                teams: 2,
                players: 4,
            }
        );
    }
}
