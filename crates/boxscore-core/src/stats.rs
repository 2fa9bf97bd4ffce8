// Batting rate statistics computed from counting totals.
//
// Everything here is pure: no I/O, no storage access. Every rate returns
// exactly 0.0 when its denominator is zero.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Season aggregate
// ---------------------------------------------------------------------------

/// Counting totals for one player over one season, plus derived rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BattingStats {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub season_id: String,
    pub season: String,
    pub plate_appearances: u32,
    pub at_bats: u32,
    pub hits: u32,
    pub doubles: u32,
    pub triples: u32,
    pub home_runs: u32,
    pub rbis: u32,
    pub runs: u32,
    pub stolen_bases: u32,
    pub caught_stealing: u32,
    pub walks: u32,
    pub strikeouts: u32,
}

fn ratio(numerator: f64, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / f64::from(denominator)
    }
}

impl BattingStats {
    /// H / AB.
    pub fn batting_average(&self) -> f64 {
        ratio(f64::from(self.hits), self.at_bats)
    }

    /// (H + BB) / PA.
    pub fn on_base_percentage(&self) -> f64 {
        ratio(f64::from(self.hits) + f64::from(self.walks), self.plate_appearances)
    }

    /// H + 2B + 2*3B + 3*HR, i.e. singles count once and each extra base on
    /// top of that once more.
    pub fn total_bases(&self) -> f64 {
        f64::from(self.hits)
            + f64::from(self.doubles)
            + 2.0 * f64::from(self.triples)
            + 3.0 * f64::from(self.home_runs)
    }

    /// Total bases / AB.
    pub fn slugging_percentage(&self) -> f64 {
        ratio(self.total_bases(), self.at_bats)
    }

    /// On-base plus slugging.
    pub fn ops(&self) -> f64 {
        self.on_base_percentage() + self.slugging_percentage()
    }

    /// SB / (SB + CS).
    pub fn stolen_base_percentage(&self) -> f64 {
        let attempts = self.stolen_bases.saturating_add(self.caught_stealing);
        ratio(f64::from(self.stolen_bases), attempts)
    }

    /// Copy of the identity fields with every counting total at zero.
    pub fn zeroed(&self) -> Self {
        Self {
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
            team: self.team.clone(),
            season_id: self.season_id.clone(),
            season: self.season.clone(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Monthly split
// ---------------------------------------------------------------------------

/// One calendar month of a player's season.
///
/// When `injured` is set the player did not appear that month: the totals are
/// zero and every rate accessor returns `None`, so a consumer can show "no
/// data" instead of a .000 month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyBattingStats {
    pub month: u32,
    pub injured: bool,
    pub stats: BattingStats,
}

impl MonthlyBattingStats {
    pub fn played(month: u32, stats: BattingStats) -> Self {
        Self {
            month,
            injured: false,
            stats,
        }
    }

    /// A month with no appearances. Totals are forced to zero.
    pub fn unavailable(month: u32, identity: &BattingStats) -> Self {
        Self {
            month,
            injured: true,
            stats: identity.zeroed(),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.injured
    }

    fn rate(&self, f: impl Fn(&BattingStats) -> f64) -> Option<f64> {
        self.is_available().then(|| f(&self.stats))
    }

    pub fn batting_average(&self) -> Option<f64> {
        self.rate(BattingStats::batting_average)
    }

    pub fn on_base_percentage(&self) -> Option<f64> {
        self.rate(BattingStats::on_base_percentage)
    }

    pub fn slugging_percentage(&self) -> Option<f64> {
        self.rate(BattingStats::slugging_percentage)
    }

    pub fn ops(&self) -> Option<f64> {
        self.rate(BattingStats::ops)
    }

    pub fn stolen_base_percentage(&self) -> Option<f64> {
        self.rate(BattingStats::stolen_base_percentage)
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// Three-decimal rate in box-score style: `.500`, `1.083`.
pub fn format_rate(value: f64) -> String {
    let text = format!("{value:.3}");
    match text.strip_prefix("0.") {
        Some(rest) => format!(".{rest}"),
        None => text,
    }
}

/// Percentage with one decimal: `72.7%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Rate or the "no data" marker for an unavailable month.
pub fn format_optional_rate(value: Option<f64>) -> String {
    value.map(format_rate).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(pa: u32, ab: u32, h: u32, doubles: u32, triples: u32, hr: u32, bb: u32) -> BattingStats {
        BattingStats {
            plate_appearances: pa,
            at_bats: ab,
            hits: h,
            doubles,
            triples,
            home_runs: hr,
            walks: bb,
            ..BattingStats::default()
        }
    }

    #[test]
    fn zero_denominators_give_zero() {
        let s = BattingStats::default();
        assert_eq!(s.batting_average(), 0.0);
        assert_eq!(s.on_base_percentage(), 0.0);
        assert_eq!(s.slugging_percentage(), 0.0);
        assert_eq!(s.ops(), 0.0);
        assert_eq!(s.stolen_base_percentage(), 0.0);
    }

    #[test]
    fn average_is_exact_ratio() {
        for ab in 1..=20u32 {
            for h in 0..=ab {
                let s = line(ab, ab, h, 0, 0, 0, 0);
                assert_eq!(s.batting_average(), f64::from(h) / f64::from(ab));
            }
        }
    }

    #[test]
    fn ops_is_sum_of_components() {
        for (pa, ab, h, d, t, hr, bb) in [
            (450, 400, 120, 25, 2, 15, 40),
            (4, 4, 2, 0, 0, 0, 0),
            (5, 0, 0, 0, 0, 0, 5),
            (0, 0, 0, 0, 0, 0, 0),
            (520, 470, 140, 30, 4, 28, 42),
        ] {
            let s = line(pa, ab, h, d, t, hr, bb);
            assert_eq!(s.ops(), s.on_base_percentage() + s.slugging_percentage());
        }
    }

    #[test]
    fn season_line_rates() {
        let s = line(450, 400, 120, 25, 2, 15, 40);
        assert!((s.batting_average() - 0.300).abs() < 1e-12);
        assert!((s.on_base_percentage() - 160.0 / 450.0).abs() < 1e-12);
        // 120 + 25 + 4 + 45 = 194 total bases
        assert_eq!(s.total_bases(), 194.0);
        assert!((s.slugging_percentage() - 194.0 / 400.0).abs() < 1e-12);
    }

    #[test]
    fn stolen_base_percentage() {
        let mut s = BattingStats {
            stolen_bases: 8,
            caught_stealing: 3,
            ..BattingStats::default()
        };
        assert!((s.stolen_base_percentage() - 8.0 / 11.0).abs() < 1e-12);
        assert_eq!(format_percent(s.stolen_base_percentage()), "72.7%");

        s.stolen_bases = 0;
        assert_eq!(s.stolen_base_percentage(), 0.0);
    }

    #[test]
    fn injured_month_hides_rates() {
        let base = BattingStats {
            player_id: "P1".into(),
            player_name: "Lin".into(),
            hits: 30,
            at_bats: 90,
            ..BattingStats::default()
        };
        let month = MonthlyBattingStats::unavailable(5, &base);
        assert!(!month.is_available());
        assert_eq!(month.stats.hits, 0);
        assert_eq!(month.stats.player_name, "Lin");
        assert_eq!(month.batting_average(), None);
        assert_eq!(month.ops(), None);
        assert_eq!(format_optional_rate(month.ops()), "-");

        let played = MonthlyBattingStats::played(4, base);
        assert_eq!(played.batting_average(), Some(30.0 / 90.0));
    }

    #[test]
    fn rate_formatting() {
        assert_eq!(format_rate(0.5), ".500");
        assert_eq!(format_rate(0.0), ".000");
        assert_eq!(format_rate(1.0833), "1.083");
    }
}
