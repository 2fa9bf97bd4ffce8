// Pass 2: games and the rows that hang off them.
//
// Each game's nested arrays (batter box, pitcher box, plate-appearance list,
// one of each per side) are flattened into rows tagged with the side and the
// game's (season id, sequence) key. Reloading a game replaces its rows:
// existing batter, pitcher and PA rows for that key are deleted before the
// new ones are written.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::dimensions;
use crate::resolve::{
    parse_date, resolve_array, resolve_bool, resolve_int, resolve_int_opt, resolve_text, Record,
};
use crate::schema::Side;

/// Rows written during one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactCounts {
    pub games: usize,
    pub batters: usize,
    pub pitchers: usize,
    pub plate_appearances: usize,
    /// Game records that were not objects or lacked a season id / sequence.
    pub skipped_records: usize,
}

// ---------------------------------------------------------------------------
// Row shapes
// ---------------------------------------------------------------------------

/// Composite identity of a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameKey {
    pub season_id: String,
    pub seq: i64,
}

impl GameKey {
    pub fn new(season_id: impl Into<String>, seq: i64) -> Self {
        Self {
            season_id: season_id.into(),
            seq,
        }
    }
}

/// Top-level fields of one game record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub key: GameKey,
    /// `YYYY-MM-DD` when the source date parses, otherwise the raw text.
    pub date: String,
    pub stadium: String,
    pub away_team_id: String,
    pub home_team_id: String,
}

impl GameRow {
    /// `None` when the composite key cannot be formed.
    pub fn from_record(record: &Record) -> Option<Self> {
        let season_id = resolve_text(record, &["seasonId"]);
        let seq = resolve_int_opt(record, &["seq"])?;
        if season_id.is_empty() {
            return None;
        }
        let raw_date = resolve_text(record, &["date"]);
        let date = parse_date(&raw_date)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or(raw_date);
        Some(Self {
            key: GameKey { season_id, seq },
            date,
            stadium: resolve_text(record, &["stadium"]),
            away_team_id: resolve_text(record, &["awayTeamId"]),
            home_team_id: resolve_text(record, &["homeTeamId"]),
        })
    }
}

/// One batter's line in a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatterLine {
    pub side: Side,
    pub batting_order: i64,
    pub player_id: String,
    pub pa: i64,
    pub ab: i64,
    pub r: i64,
    pub h: i64,
    pub rbi: i64,
    pub doubles: i64,
    pub triples: i64,
    pub hr: i64,
    pub gidp: i64,
    pub dp: i64,
    pub tp: i64,
    pub bb: i64,
    pub ibb: i64,
    pub hbp: i64,
    pub so: i64,
    pub sh: i64,
    pub sf: i64,
    pub e: i64,
    pub sb: i64,
    pub cs: i64,
}

impl BatterLine {
    pub fn from_record(side: Side, record: &Record) -> Self {
        let n = |name: &str| resolve_int(record, &[name]);
        Self {
            side,
            batting_order: n("order"),
            player_id: resolve_text(record, &["playerId"]),
            pa: n("PA"),
            ab: n("AB"),
            r: n("R"),
            h: n("H"),
            rbi: n("RBI"),
            doubles: n("2B"),
            triples: n("3B"),
            hr: n("HR"),
            gidp: n("GIDP"),
            dp: n("DP"),
            tp: n("TP"),
            bb: n("BB"),
            ibb: n("IBB"),
            hbp: n("HBP"),
            so: n("SO"),
            sh: n("SH"),
            sf: n("SF"),
            e: n("E"),
            sb: n("SB"),
            cs: n("CS"),
        }
    }
}

/// One pitcher's line in a game. `ip_outs` counts outs recorded (3 per
/// inning).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PitcherLine {
    pub side: Side,
    pub pitching_order: i64,
    pub player_id: String,
    pub ip_outs: i64,
    pub np: i64,
    pub bf: i64,
    pub h: i64,
    pub hr: i64,
    pub bb: i64,
    pub ibb: i64,
    pub hb: i64,
    pub so: i64,
    pub r: i64,
    pub er: i64,
}

impl PitcherLine {
    pub fn from_record(side: Side, record: &Record) -> Self {
        let n = |name: &str| resolve_int(record, &[name]);
        Self {
            side,
            pitching_order: n("order"),
            player_id: resolve_text(record, &["playerId"]),
            ip_outs: n("IPOuts"),
            np: n("NP"),
            bf: n("BF"),
            h: n("H"),
            hr: n("HR"),
            bb: n("BB"),
            ibb: n("IBB"),
            hb: n("HB"),
            so: n("SO"),
            r: n("R"),
            er: n("ER"),
        }
    }

    /// Innings pitched as a decimal (7 outs -> 2.333...).
    pub fn innings(&self) -> f64 {
        self.ip_outs as f64 / 3.0
    }
}

/// One plate appearance. Base state is the source's compact occupancy
/// string; the win-expectancy and run-expectancy values are kept as opaque
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateAppearance {
    pub side: Side,
    pub inning: i64,
    pub scored: bool,
    pub batter_id: String,
    pub batter_hand: String,
    pub pitcher_id: String,
    pub pitcher_hand: String,
    pub catcher_id: String,
    pub pa_round: i64,
    pub pa_order: i64,
    pub is_ph: bool,
    pub away_scores: i64,
    pub home_scores: i64,
    pub strikes: i64,
    pub balls: i64,
    pub outs: i64,
    pub bases: String,
    pub home_we: String,
    pub re: String,
    pub result: String,
    pub rbi: i64,
    pub location_code: String,
    pub trajectory: String,
    pub hardness: String,
    pub end_away_scores: i64,
    pub end_home_scores: i64,
    pub end_outs: i64,
    pub end_bases: String,
    pub wpa: String,
    pub re24: String,
}

impl PlateAppearance {
    pub fn from_record(side: Side, record: &Record) -> Self {
        let n = |name: &str| resolve_int(record, &[name]);
        let t = |name: &str| resolve_text(record, &[name]);
        Self {
            side,
            inning: n("inning"),
            scored: resolve_bool(record, &["scored"]),
            batter_id: t("batterId"),
            batter_hand: t("batterHand"),
            pitcher_id: t("pitcherId"),
            pitcher_hand: t("pitcherHand"),
            catcher_id: t("catcherId"),
            pa_round: n("paRound"),
            pa_order: n("paOrder"),
            is_ph: resolve_bool(record, &["isPH"]),
            away_scores: n("awayScores"),
            home_scores: n("homeScores"),
            strikes: n("strikes"),
            balls: n("balls"),
            outs: n("outs"),
            bases: t("bases"),
            home_we: t("homeWE"),
            re: t("RE"),
            result: t("result"),
            rbi: n("RBI"),
            location_code: t("locationCode"),
            trajectory: t("trajectory"),
            hardness: t("hardness"),
            end_away_scores: n("endAwayScores"),
            end_home_scores: n("endHomeScores"),
            end_outs: n("endOuts"),
            end_bases: t("endBases"),
            wpa: t("WPA"),
            re24: t("RE24"),
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Delete the batter, pitcher and PA rows of one game.
fn clear_game_facts(conn: &Connection, key: &GameKey) -> Result<()> {
    for table in ["batter_box", "pitcher_box", "plate_appearances"] {
        conn.prepare_cached(&format!(
            "DELETE FROM {table} WHERE season_id = ?1 AND game_seq = ?2"
        ))
        .and_then(|mut stmt| stmt.execute(params![key.season_id, key.seq]))
        .with_context(|| {
            format!(
                "failed to clear {table} for game {}/{}",
                key.season_id, key.seq
            )
        })?;
    }
    Ok(())
}

fn insert_game(conn: &Connection, game: &GameRow, stadium_id: Option<i64>) -> Result<()> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO games
            (season_id, seq, date, stadium_id, away_team_id, home_team_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            game.key.season_id,
            game.key.seq,
            game.date,
            stadium_id,
            game.away_team_id,
            game.home_team_id,
        ])
    })
    .with_context(|| format!("failed to insert game {}/{}", game.key.season_id, game.key.seq))?;
    Ok(())
}

fn insert_batter(conn: &Connection, key: &GameKey, b: &BatterLine) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO batter_box
            (season_id, game_seq, side, batting_order, player_id,
             pa, ab, r, h, rbi, doubles, triples, hr, gidp, dp, tp,
             bb, ibb, hbp, so, sh, sf, e, sb, cs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            key.season_id,
            key.seq,
            b.side,
            b.batting_order,
            b.player_id,
            b.pa,
            b.ab,
            b.r,
            b.h,
            b.rbi,
            b.doubles,
            b.triples,
            b.hr,
            b.gidp,
            b.dp,
            b.tp,
            b.bb,
            b.ibb,
            b.hbp,
            b.so,
            b.sh,
            b.sf,
            b.e,
            b.sb,
            b.cs,
        ])
    })
    .context("failed to insert batter line")?;
    Ok(())
}

/// Pitcher slots are unique per (game, side, order); a repeated slot
/// replaces the earlier row.
fn insert_pitcher(conn: &Connection, key: &GameKey, p: &PitcherLine) -> Result<()> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO pitcher_box
            (season_id, game_seq, side, pitching_order, player_id,
             ip_outs, np, bf, h, hr, bb, ibb, hb, so, r, er)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            key.season_id,
            key.seq,
            p.side,
            p.pitching_order,
            p.player_id,
            p.ip_outs,
            p.np,
            p.bf,
            p.h,
            p.hr,
            p.bb,
            p.ibb,
            p.hb,
            p.so,
            p.r,
            p.er,
        ])
    })
    .context("failed to insert pitcher line")?;
    Ok(())
}

fn insert_plate_appearance(conn: &Connection, key: &GameKey, pa: &PlateAppearance) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO plate_appearances
            (season_id, game_seq, side, inning, scored,
             batter_id, batter_hand, pitcher_id, pitcher_hand, catcher_id,
             pa_round, pa_order, is_ph, away_scores, home_scores,
             strikes, balls, outs, bases, home_we, re, result, rbi,
             location_code, trajectory, hardness,
             end_away_scores, end_home_scores, end_outs, end_bases, wpa, re24)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                 ?31, ?32)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            key.season_id,
            key.seq,
            pa.side,
            pa.inning,
            pa.scored,
            pa.batter_id,
            pa.batter_hand,
            pa.pitcher_id,
            pa.pitcher_hand,
            pa.catcher_id,
            pa.pa_round,
            pa.pa_order,
            pa.is_ph,
            pa.away_scores,
            pa.home_scores,
            pa.strikes,
            pa.balls,
            pa.outs,
            pa.bases,
            pa.home_we,
            pa.re,
            pa.result,
            pa.rbi,
            pa.location_code,
            pa.trajectory,
            pa.hardness,
            pa.end_away_scores,
            pa.end_home_scores,
            pa.end_outs,
            pa.end_bases,
            pa.wpa,
            pa.re24,
        ])
    })
    .context("failed to insert plate appearance")?;
    Ok(())
}

/// Object entries of one side's nested array; anything else is dropped.
fn entries<'a>(game: &'a Record, side: Side, suffix: &str) -> impl Iterator<Item = &'a Record> {
    resolve_array(game, &[side.field(suffix).as_str()])
        .iter()
        .filter_map(Value::as_object)
}

/// Rows stored for one game key.
#[derive(Debug, Default)]
struct GameFacts {
    batters: usize,
    pitchers: usize,
    plate_appearances: usize,
}

/// Write one game and its nested rows, replacing anything stored under the
/// same key.
fn load_game(conn: &Connection, record: &Record, row: &GameRow) -> Result<GameFacts> {
    let stadium_id = dimensions::stadium_id(conn, &row.stadium)?;
    clear_game_facts(conn, &row.key)?;
    insert_game(conn, row, stadium_id)?;

    let mut facts = GameFacts::default();
    for side in Side::ALL {
        for entry in entries(record, side, "BatterBox") {
            insert_batter(conn, &row.key, &BatterLine::from_record(side, entry))?;
            facts.batters += 1;
        }
    }
    let mut slots = HashSet::new();
    for side in Side::ALL {
        for entry in entries(record, side, "PitcherBox") {
            let line = PitcherLine::from_record(side, entry);
            insert_pitcher(conn, &row.key, &line)?;
            slots.insert((line.side, line.pitching_order));
        }
    }
    facts.pitchers = slots.len();
    for side in Side::ALL {
        for entry in entries(record, side, "PAList") {
            insert_plate_appearance(conn, &row.key, &PlateAppearance::from_record(side, entry))?;
            facts.plate_appearances += 1;
        }
    }
    Ok(facts)
}

/// Run the fact pass. For each game: the game row, then batter lines, then
/// pitcher lines, then plate appearances (away before home in each group).
///
/// Counts reflect the rows left in the store: a game key repeated within the
/// document replaces the earlier copy, and a repeated pitcher slot counts
/// once.
pub fn load(conn: &Connection, games: &[Value]) -> Result<FactCounts> {
    let mut counts = FactCounts::default();
    let mut stored: HashMap<GameKey, GameFacts> = HashMap::new();

    for (index, game) in games.iter().enumerate() {
        let Some(record) = game.as_object() else {
            debug!("skipping game record #{index}: not an object");
            counts.skipped_records += 1;
            continue;
        };
        let Some(row) = GameRow::from_record(record) else {
            warn!("skipping game record #{index}: missing seasonId or seq");
            counts.skipped_records += 1;
            continue;
        };

        let facts = load_game(conn, record, &row)?;
        if stored.insert(row.key.clone(), facts).is_some() {
            warn!(
                "game {}/{} appears more than once; record #{index} replaces the earlier copy",
                row.key.season_id, row.key.seq
            );
        }
    }

    counts.games = stored.len();
    for facts in stored.values() {
        counts.batters += facts.batters;
        counts.pitchers += facts.pitchers;
        counts.plate_appearances += facts.plate_appearances;
    }

    info!(
        "game data: {} games, {} batters, {} pitchers, {} PA ({} records skipped)",
        counts.games, counts.batters, counts.pitchers, counts.plate_appearances,
        counts.skipped_records
    );
    Ok(counts)
}
