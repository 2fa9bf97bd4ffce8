// Table definitions for the two ingestion profiles.
//
// Both schemas are applied with CREATE ... IF NOT EXISTS, so opening an
// existing store is a no-op. Referential integrity between fact rows and
// games is guaranteed by load ordering inside one transaction; no FOREIGN KEY
// clauses are declared.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Which shape of input the pipeline expects and which tables it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Nested game documents loaded into the full relational schema.
    #[default]
    Structured,
    /// Flat, arbitrarily-keyed event records loaded into one table.
    Flexible,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Structured => "structured",
            Profile::Flexible => "flexible",
        }
    }

    /// DDL for this profile's tables and indexes.
    pub fn ddl(self) -> &'static str {
        match self {
            Profile::Structured => STRUCTURED_DDL,
            Profile::Flexible => FLEXIBLE_DDL,
        }
    }

    /// Tables created by [`Profile::ddl`].
    pub fn tables(self) -> &'static [&'static str] {
        match self {
            Profile::Structured => STRUCTURED_TABLES,
            Profile::Flexible => FLEXIBLE_TABLES,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(Profile::Structured),
            "flexible" => Ok(Profile::Flexible),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

/// Which team a box line or plate appearance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Away,
    Home,
}

impl Side {
    /// Processing order for a game's nested arrays.
    pub const ALL: [Side; 2] = [Side::Away, Side::Home];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Away => "away",
            Side::Home => "home",
        }
    }

    /// Name of this side's nested array, e.g. `awayBatterBox`.
    pub fn field(self, suffix: &str) -> String {
        format!("{}{suffix}", self.as_str())
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "away" => Ok(Side::Away),
            "home" => Ok(Side::Home),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

impl ToSql for Side {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Side {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

const STRUCTURED_TABLES: &[&str] = &[
    "stadiums",
    "seasons",
    "teams",
    "players",
    "games",
    "batter_box",
    "pitcher_box",
    "plate_appearances",
];

const FLEXIBLE_TABLES: &[&str] = &["batting_events"];

const STRUCTURED_DDL: &str = "
    CREATE TABLE IF NOT EXISTS stadiums (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS seasons (
        season_id TEXT PRIMARY KEY,
        name      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS teams (
        team_id TEXT PRIMARY KEY,
        name    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS players (
        player_id TEXT PRIMARY KEY,
        number    TEXT NOT NULL DEFAULT '',
        name      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS games (
        season_id    TEXT NOT NULL,
        seq          INTEGER NOT NULL,
        date         TEXT NOT NULL DEFAULT '',
        stadium_id   INTEGER,
        away_team_id TEXT NOT NULL DEFAULT '',
        home_team_id TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (season_id, seq)
    );

    CREATE TABLE IF NOT EXISTS batter_box (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        season_id     TEXT NOT NULL,
        game_seq      INTEGER NOT NULL,
        side          TEXT NOT NULL,
        batting_order INTEGER NOT NULL,
        player_id     TEXT NOT NULL,
        pa INTEGER NOT NULL, ab INTEGER NOT NULL, r INTEGER NOT NULL,
        h INTEGER NOT NULL, rbi INTEGER NOT NULL,
        doubles INTEGER NOT NULL, triples INTEGER NOT NULL, hr INTEGER NOT NULL,
        gidp INTEGER NOT NULL, dp INTEGER NOT NULL, tp INTEGER NOT NULL,
        bb INTEGER NOT NULL, ibb INTEGER NOT NULL, hbp INTEGER NOT NULL,
        so INTEGER NOT NULL, sh INTEGER NOT NULL, sf INTEGER NOT NULL,
        e INTEGER NOT NULL, sb INTEGER NOT NULL, cs INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_batter_box_game ON batter_box(season_id, game_seq, side);
    CREATE INDEX IF NOT EXISTS idx_batter_box_player ON batter_box(player_id);

    CREATE TABLE IF NOT EXISTS pitcher_box (
        season_id      TEXT NOT NULL,
        game_seq       INTEGER NOT NULL,
        side           TEXT NOT NULL,
        pitching_order INTEGER NOT NULL,
        player_id      TEXT NOT NULL,
        ip_outs INTEGER NOT NULL, np INTEGER NOT NULL, bf INTEGER NOT NULL,
        h INTEGER NOT NULL, hr INTEGER NOT NULL,
        bb INTEGER NOT NULL, ibb INTEGER NOT NULL, hb INTEGER NOT NULL,
        so INTEGER NOT NULL, r INTEGER NOT NULL, er INTEGER NOT NULL,
        PRIMARY KEY (season_id, game_seq, side, pitching_order)
    );
    CREATE INDEX IF NOT EXISTS idx_pitcher_box_player ON pitcher_box(player_id);

    CREATE TABLE IF NOT EXISTS plate_appearances (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        season_id       TEXT NOT NULL,
        game_seq        INTEGER NOT NULL,
        side            TEXT NOT NULL,
        inning          INTEGER NOT NULL,
        scored          INTEGER NOT NULL,
        batter_id       TEXT NOT NULL,
        batter_hand     TEXT NOT NULL,
        pitcher_id      TEXT NOT NULL,
        pitcher_hand    TEXT NOT NULL,
        catcher_id      TEXT NOT NULL,
        pa_round        INTEGER NOT NULL,
        pa_order        INTEGER NOT NULL,
        is_ph           INTEGER NOT NULL,
        away_scores     INTEGER NOT NULL,
        home_scores     INTEGER NOT NULL,
        strikes         INTEGER NOT NULL,
        balls           INTEGER NOT NULL,
        outs            INTEGER NOT NULL,
        bases           TEXT NOT NULL,
        home_we         TEXT NOT NULL,
        re              TEXT NOT NULL,
        result          TEXT NOT NULL,
        rbi             INTEGER NOT NULL,
        location_code   TEXT NOT NULL,
        trajectory      TEXT NOT NULL,
        hardness        TEXT NOT NULL,
        end_away_scores INTEGER NOT NULL,
        end_home_scores INTEGER NOT NULL,
        end_outs        INTEGER NOT NULL,
        end_bases       TEXT NOT NULL,
        wpa             TEXT NOT NULL,
        re24            TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pa_game ON plate_appearances(season_id, game_seq, side, inning);
    CREATE INDEX IF NOT EXISTS idx_pa_batter ON plate_appearances(batter_id);
    CREATE INDEX IF NOT EXISTS idx_pa_pitcher ON plate_appearances(pitcher_id);
";

const FLEXIBLE_DDL: &str = "
    CREATE TABLE IF NOT EXISTS batting_events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        date        TEXT NOT NULL,
        game_id     TEXT,
        player_id   TEXT,
        player_name TEXT,
        team        TEXT,
        ab INTEGER NOT NULL, h INTEGER NOT NULL,
        hr INTEGER NOT NULL, bb INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_batting_events_date ON batting_events(date);
    CREATE INDEX IF NOT EXISTS idx_batting_events_player ON batting_events(player_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parses_case_insensitively() {
        assert_eq!("Structured".parse::<Profile>(), Ok(Profile::Structured));
        assert_eq!(" flexible ".parse::<Profile>(), Ok(Profile::Flexible));
        assert!("relational".parse::<Profile>().is_err());
    }

    #[test]
    fn side_field_names() {
        assert_eq!(Side::Away.field("BatterBox"), "awayBatterBox");
        assert_eq!(Side::Home.field("PAList"), "homePAList");
        assert_eq!("home".parse::<Side>(), Ok(Side::Home));
    }

    #[test]
    fn every_listed_table_is_created_by_its_ddl() {
        for profile in [Profile::Structured, Profile::Flexible] {
            for table in profile.tables() {
                let needle = format!("CREATE TABLE IF NOT EXISTS {table} (");
                assert!(profile.ddl().contains(&needle), "{profile}: {table}");
            }
        }
    }
}
