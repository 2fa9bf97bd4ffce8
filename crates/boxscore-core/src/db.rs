// SQLite store: schema setup, the load transaction, and read-side queries.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use tracing::{info, warn};

use crate::ingest::facts::{BatterLine, GameKey, PitcherLine};
use crate::ingest::flexible::BattingEvent;
use crate::schema::Profile;
use crate::stats::{BattingStats, MonthlyBattingStats};

/// Storage handle for one SQLite database file.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure the tables of
    /// `profile` exist. Pass `":memory:"` for an ephemeral in-memory database
    /// (useful for tests).
    ///
    /// Schema creation is idempotent and happens outside any load
    /// transaction.
    pub fn open(path: &str, profile: Profile) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(profile.ddl())
            .with_context(|| format!("failed to create {profile} schema"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `load` inside a single transaction.
    ///
    /// Commits exactly once when `load` returns `Ok`. On `Err` the
    /// transaction is rolled back and nothing `load` wrote survives.
    pub fn in_transaction<T, F>(&self, load: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin load transaction")?;

        match load(&tx) {
            Ok(value) => {
                tx.commit().context("failed to commit load transaction")?;
                info!("load transaction committed");
                Ok(value)
            }
            Err(e) => {
                warn!("load failed, rolling back: {e:#}");
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    /// Number of rows in one of the known tables.
    pub fn table_count(&self, table: &str) -> Result<usize> {
        let known = [Profile::Structured, Profile::Flexible]
            .iter()
            .any(|p| p.tables().contains(&table));
        if !known {
            bail!("unknown table `{table}`");
        }
        let conn = self.conn();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Fact rows
    // ------------------------------------------------------------------

    /// Batter box lines for one game, away side first, in batting order.
    pub fn batter_lines(&self, key: &GameKey) -> Result<Vec<BatterLine>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT side, batting_order, player_id,
                        pa, ab, r, h, rbi, doubles, triples, hr, gidp, dp, tp,
                        bb, ibb, hbp, so, sh, sf, e, sb, cs
                 FROM batter_box
                 WHERE season_id = ?1 AND game_seq = ?2
                 ORDER BY side, batting_order, id",
            )
            .context("failed to prepare batter_lines query")?;

        let lines = stmt
            .query_map(params![key.season_id, key.seq], |row| {
                Ok(BatterLine {
                    side: row.get(0)?,
                    batting_order: row.get(1)?,
                    player_id: row.get(2)?,
                    pa: row.get(3)?,
                    ab: row.get(4)?,
                    r: row.get(5)?,
                    h: row.get(6)?,
                    rbi: row.get(7)?,
                    doubles: row.get(8)?,
                    triples: row.get(9)?,
                    hr: row.get(10)?,
                    gidp: row.get(11)?,
                    dp: row.get(12)?,
                    tp: row.get(13)?,
                    bb: row.get(14)?,
                    ibb: row.get(15)?,
                    hbp: row.get(16)?,
                    so: row.get(17)?,
                    sh: row.get(18)?,
                    sf: row.get(19)?,
                    e: row.get(20)?,
                    sb: row.get(21)?,
                    cs: row.get(22)?,
                })
            })
            .context("failed to query batter lines")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map batter line rows")?;

        Ok(lines)
    }

    /// Pitcher box lines for one game, away side first, in pitching order.
    pub fn pitcher_lines(&self, key: &GameKey) -> Result<Vec<PitcherLine>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT side, pitching_order, player_id,
                        ip_outs, np, bf, h, hr, bb, ibb, hb, so, r, er
                 FROM pitcher_box
                 WHERE season_id = ?1 AND game_seq = ?2
                 ORDER BY side, pitching_order",
            )
            .context("failed to prepare pitcher_lines query")?;

        let lines = stmt
            .query_map(params![key.season_id, key.seq], |row| {
                Ok(PitcherLine {
                    side: row.get(0)?,
                    pitching_order: row.get(1)?,
                    player_id: row.get(2)?,
                    ip_outs: row.get(3)?,
                    np: row.get(4)?,
                    bf: row.get(5)?,
                    h: row.get(6)?,
                    hr: row.get(7)?,
                    bb: row.get(8)?,
                    ibb: row.get(9)?,
                    hb: row.get(10)?,
                    so: row.get(11)?,
                    r: row.get(12)?,
                    er: row.get(13)?,
                })
            })
            .context("failed to query pitcher lines")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pitcher line rows")?;

        Ok(lines)
    }

    /// Every flexible-profile event, in load order.
    pub fn batting_events(&self) -> Result<Vec<BattingEvent>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT date, game_id, player_id, player_name, team, ab, h, hr, bb
                 FROM batting_events ORDER BY id",
            )
            .context("failed to prepare batting_events query")?;

        let events = stmt
            .query_map([], |row| {
                let raw: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })?;
                Ok(BattingEvent {
                    date,
                    game_id: row.get(1)?,
                    player_id: row.get(2)?,
                    player_name: row.get(3)?,
                    team: row.get(4)?,
                    ab: row.get(5)?,
                    h: row.get(6)?,
                    hr: row.get(7)?,
                    bb: row.get(8)?,
                })
            })
            .context("failed to query batting events")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map batting event rows")?;

        Ok(events)
    }

    // ------------------------------------------------------------------
    // Batting aggregates
    // ------------------------------------------------------------------

    /// Season totals for every batter with a player id, best OPS first.
    pub fn season_batting_stats(&self, season_id: &str) -> Result<Vec<BattingStats>> {
        let mut stats = self.query_batting(season_id, None)?;
        stats.sort_by(|a, b| {
            b.ops()
                .total_cmp(&a.ops())
                .then_with(|| a.player_name.cmp(&b.player_name))
        });
        Ok(stats)
    }

    /// Season totals for one player, or `None` if they never batted.
    pub fn player_season_stats(
        &self,
        player_id: &str,
        season_id: &str,
    ) -> Result<Option<BattingStats>> {
        Ok(self.query_batting(season_id, Some(player_id))?.into_iter().next())
    }

    /// Month-by-month split from the player's first to last month with an
    /// appearance. Months in between without a game are marked unavailable.
    pub fn monthly_batting_stats(
        &self,
        player_id: &str,
        season_id: &str,
    ) -> Result<Vec<MonthlyBattingStats>> {
        let Some(season) = self.player_season_stats(player_id, season_id)? else {
            return Ok(Vec::new());
        };

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT CAST(substr(g.date, 6, 2) AS INTEGER) AS month,
                        SUM(b.pa), SUM(b.ab), SUM(b.h), SUM(b.doubles), SUM(b.triples),
                        SUM(b.hr), SUM(b.rbi), SUM(b.r), SUM(b.sb), SUM(b.cs),
                        SUM(b.bb), SUM(b.so)
                 FROM batter_box b
                 JOIN games g ON g.season_id = b.season_id AND g.seq = b.game_seq
                 WHERE b.season_id = ?1 AND b.player_id = ?2
                   AND g.date GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'
                 GROUP BY month
                 ORDER BY month",
            )
            .context("failed to prepare monthly batting query")?;

        let played: BTreeMap<u32, BattingStats> = stmt
            .query_map(params![season_id, player_id], |row| {
                let month: u32 = row.get(0)?;
                let mut stats = season.zeroed();
                read_totals(row, 1, &mut stats)?;
                Ok((month, stats))
            })
            .context("failed to query monthly batting totals")?
            .collect::<std::result::Result<_, _>>()
            .context("failed to map monthly batting rows")?;

        let (Some(&first), Some(&last)) = (played.keys().next(), played.keys().next_back())
        else {
            return Ok(Vec::new());
        };

        let months = (first..=last)
            .map(|month| match played.get(&month) {
                Some(stats) => MonthlyBattingStats::played(month, stats.clone()),
                None => MonthlyBattingStats::unavailable(month, &season),
            })
            .collect();
        Ok(months)
    }

    fn query_batting(&self, season_id: &str, player_id: Option<&str>) -> Result<Vec<BattingStats>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT b.player_id,
                        COALESCE(p.name, ''),
                        b.season_id,
                        COALESCE(s.name, b.season_id),
                        COALESCE((
                            SELECT t.name
                            FROM batter_box b2
                            JOIN games g2 ON g2.season_id = b2.season_id AND g2.seq = b2.game_seq
                            JOIN teams t ON t.team_id = CASE b2.side
                                WHEN 'home' THEN g2.home_team_id
                                ELSE g2.away_team_id END
                            WHERE b2.season_id = b.season_id AND b2.player_id = b.player_id
                            ORDER BY g2.date DESC, g2.seq DESC
                            LIMIT 1
                        ), ''),
                        SUM(b.pa), SUM(b.ab), SUM(b.h), SUM(b.doubles), SUM(b.triples),
                        SUM(b.hr), SUM(b.rbi), SUM(b.r), SUM(b.sb), SUM(b.cs),
                        SUM(b.bb), SUM(b.so)
                 FROM batter_box b
                 LEFT JOIN players p ON p.player_id = b.player_id
                 LEFT JOIN seasons s ON s.season_id = b.season_id
                 WHERE b.season_id = ?1
                   AND b.player_id <> ''
                   AND (?2 IS NULL OR b.player_id = ?2)
                 GROUP BY b.player_id",
            )
            .context("failed to prepare batting totals query")?;

        let stats = stmt
            .query_map(params![season_id, player_id], |row| {
                let mut stats = BattingStats {
                    player_id: row.get(0)?,
                    player_name: row.get(1)?,
                    season_id: row.get(2)?,
                    season: row.get(3)?,
                    team: row.get(4)?,
                    ..BattingStats::default()
                };
                read_totals(row, 5, &mut stats)?;
                Ok(stats)
            })
            .context("failed to query batting totals")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map batting totals rows")?;

        Ok(stats)
    }
}

/// Read the twelve summed counting columns starting at `first`.
fn read_totals(row: &Row<'_>, first: usize, stats: &mut BattingStats) -> rusqlite::Result<()> {
    let count = |offset: usize| -> rusqlite::Result<u32> {
        let total: Option<i64> = row.get(first + offset)?;
        Ok(total.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32)
    };
    stats.plate_appearances = count(0)?;
    stats.at_bats = count(1)?;
    stats.hits = count(2)?;
    stats.doubles = count(3)?;
    stats.triples = count(4)?;
    stats.home_runs = count(5)?;
    stats.rbis = count(6)?;
    stats.runs = count(7)?;
    stats.stolen_bases = count(8)?;
    stats.caught_stealing = count(9)?;
    stats.walks = count(10)?;
    stats.strikeouts = count(11)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::ingest;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:", Profile::Structured).expect("in-memory database should open")
    }

    fn table_names(db: &Database) -> Vec<String> {
        let conn = db.conn();
        let names = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        names
    }

    fn batter(order: i64, id: &str, name: &str, ab: i64, h: i64) -> serde_json::Value {
        json!({"order": order, "playerId": id, "playerName": name, "PA": ab, "AB": ab, "H": h})
    }

    fn game(seq: i64, date: &str, away: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "seasonId": "2024A", "season": "2024 Regular", "seq": seq, "date": date,
            "stadium": "Taipei Dome",
            "awayTeamId": "ACN", "awayTeam": "CTBC Brothers",
            "homeTeamId": "ADD", "homeTeam": "Uni-Lions",
            "awayBatterBox": away,
        })
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_structured_tables() {
        let db = test_db();
        let tables = table_names(&db);
        for table in Profile::Structured.tables() {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        assert!(!tables.contains(&"batting_events".to_string()));
    }

    #[test]
    fn open_creates_flexible_tables() {
        let db = Database::open(":memory:", Profile::Flexible).unwrap();
        let tables = table_names(&db);
        assert!(tables.contains(&"batting_events".to_string()));
        assert!(!tables.contains(&"games".to_string()));
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let db = test_db();
        let conn = db.conn();
        conn.execute_batch(Profile::Structured.ddl())
            .expect("re-applying the schema should be a no-op");
    }

    #[test]
    fn table_count_rejects_unknown_tables() {
        let db = test_db();
        assert_eq!(db.table_count("games").unwrap(), 0);
        assert!(db.table_count("sqlite_master; DROP TABLE games").is_err());
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    #[test]
    fn in_transaction_commits_on_ok() {
        let db = test_db();
        let inserted = db
            .in_transaction(|tx| {
                tx.execute("INSERT INTO teams (team_id, name) VALUES ('ACN', 'Brothers')", [])?;
                Ok(1)
            })
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.table_count("teams").unwrap(), 1);
    }

    #[test]
    fn in_transaction_rolls_back_on_err() {
        let db = test_db();
        let result: Result<()> = db.in_transaction(|tx| {
            tx.execute("INSERT INTO teams (team_id, name) VALUES ('ACN', 'Brothers')", [])?;
            tx.execute(
                "INSERT INTO games (season_id, seq) VALUES ('2024A', 1)",
                [],
            )?;
            bail!("simulated failure after staging rows")
        });
        assert!(result.is_err());
        assert_eq!(db.table_count("teams").unwrap(), 0);
        assert_eq!(db.table_count("games").unwrap(), 0);
    }

    // ------------------------------------------------------------------
    // Batting aggregates
    // ------------------------------------------------------------------

    #[test]
    fn season_stats_sum_across_games() {
        let db = test_db();
        let doc = json!([
            game(1, "2024-03-30", vec![batter(1, "P1", "Chen", 4, 2), batter(2, "P2", "Wang", 4, 0)]),
            game(2, "2024-03-31", vec![batter(1, "P1", "Chen", 5, 1)]),
        ]);
        ingest::load_structured(&db, doc.as_array().unwrap()).unwrap();

        let p1 = db.player_season_stats("P1", "2024A").unwrap().unwrap();
        assert_eq!(p1.player_name, "Chen");
        assert_eq!(p1.season, "2024 Regular");
        assert_eq!(p1.team, "CTBC Brothers");
        assert_eq!(p1.at_bats, 9);
        assert_eq!(p1.hits, 3);
        assert!((p1.batting_average() - 3.0 / 9.0).abs() < 1e-12);

        let all = db.season_batting_stats("2024A").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].player_id, "P1");

        assert!(db.player_season_stats("P1", "2023A").unwrap().is_none());
    }

    #[test]
    fn monthly_stats_flag_gap_months() {
        let db = test_db();
        let doc = json!([
            game(1, "2024-04-02", vec![batter(1, "P1", "Chen", 4, 2)]),
            game(2, "2024-04-20", vec![batter(1, "P1", "Chen", 4, 1)]),
            game(3, "2024-06-05", vec![batter(1, "P1", "Chen", 3, 3)]),
        ]);
        ingest::load_structured(&db, doc.as_array().unwrap()).unwrap();

        let months = db.monthly_batting_stats("P1", "2024A").unwrap();
        let numbers: Vec<u32> = months.iter().map(|m| m.month).collect();
        assert_eq!(numbers, vec![4, 5, 6]);

        assert!(months[0].is_available());
        assert_eq!(months[0].stats.at_bats, 8);
        assert_eq!(months[0].stats.hits, 3);

        assert!(!months[1].is_available());
        assert_eq!(months[1].stats.at_bats, 0);
        assert_eq!(months[1].batting_average(), None);

        assert_eq!(months[2].batting_average(), Some(1.0));
    }

    #[test]
    fn monthly_stats_empty_for_unknown_player() {
        let db = test_db();
        assert!(db.monthly_batting_stats("nobody", "2024A").unwrap().is_empty());
    }
}
