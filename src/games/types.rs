use crate::config::ConfigValidationError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reel layout of a slot game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReelLayout {
    ThreeReel,
    FiveReel,
}

impl ReelLayout {
    pub fn reels(&self) -> usize {
        match self {
            ReelLayout::ThreeReel => 3,
            ReelLayout::FiveReel => 5,
        }
    }

    /// Default pay table for this layout
    pub fn pay_table(&self) -> PayTable {
        match self {
            ReelLayout::ThreeReel => PayTable::three_reel(),
            ReelLayout::FiveReel => PayTable::five_reel(),
        }
    }
}

impl fmt::Display for ReelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReelLayout::ThreeReel => write!(f, "3-reel"),
            ReelLayout::FiveReel => write!(f, "5-reel"),
        }
    }
}

/// Reel symbol with its draw weight among winning spins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub weight: u32,
    /// Full multiplier paid by a complete line of this symbol
    pub multiplier: Decimal,
}

impl Symbol {
    fn new(name: &str, weight: u32, multiplier: Decimal) -> Self {
        Self {
            name: name.to_string(),
            weight,
            multiplier,
        }
    }
}

/// N-of-a-kind win class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WinClass {
    pub name: String,
    pub matches: usize,
    pub weight: u32,
    /// Share of the symbol multiplier paid by this class
    pub factor: Decimal,
}

impl WinClass {
    fn new(name: &str, matches: usize, weight: u32, factor: Decimal) -> Self {
        Self {
            name: name.to_string(),
            matches,
            weight,
            factor,
        }
    }
}

/// Immutable payout configuration of one game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayTable {
    pub reels: usize,
    pub symbols: Vec<Symbol>,
    pub win_classes: Vec<WinClass>,
}

/// Symbol and win class matched by a reel result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMatch {
    pub symbol: usize,
    pub class: usize,
}

impl PayTable {
    pub fn three_reel() -> Self {
        Self {
            reels: 3,
            symbols: vec![
                Symbol::new("DIAMOND", 5, dec!(10)),
                Symbol::new("STAR", 10, dec!(8)),
                Symbol::new("WATERMELON", 15, dec!(5)),
                Symbol::new("GRAPE", 20, dec!(4)),
                Symbol::new("ORANGE", 20, dec!(3)),
                Symbol::new("LEMON", 15, dec!(2)),
                Symbol::new("CHERRY", 15, dec!(2)),
            ],
            win_classes: vec![WinClass::new("THREE_OF_A_KIND", 3, 100, dec!(1))],
        }
    }

    pub fn five_reel() -> Self {
        Self {
            reels: 5,
            symbols: vec![
                Symbol::new("DIAMOND", 3, dec!(100)),
                Symbol::new("SEVEN", 5, dec!(75)),
                Symbol::new("TROPHY", 7, dec!(60)),
                Symbol::new("STAR", 10, dec!(50)),
                Symbol::new("SLOT_MACHINE", 13, dec!(40)),
                Symbol::new("MONEY_BAG", 15, dec!(30)),
                Symbol::new("BELL", 17, dec!(25)),
                Symbol::new("CLOVER", 15, dec!(20)),
                Symbol::new("DICE", 15, dec!(15)),
            ],
            win_classes: vec![
                WinClass::new("FIVE_OF_A_KIND", 5, 5, dec!(1)),
                WinClass::new("FOUR_OF_A_KIND", 4, 15, dec!(0.4)),
                WinClass::new("THREE_OF_A_KIND", 3, 80, dec!(0.1)),
            ],
        }
    }

    /// Smallest run of one symbol that pays
    pub fn min_match(&self) -> usize {
        self.win_classes
            .iter()
            .map(|c| c.matches)
            .min()
            .unwrap_or(self.reels)
    }

    /// Largest multiplier any result can pay
    pub fn max_multiplier(&self) -> Decimal {
        let best_symbol = self
            .symbols
            .iter()
            .map(|s| s.multiplier)
            .max()
            .unwrap_or(Decimal::ZERO);
        let best_factor = self
            .win_classes
            .iter()
            .map(|c| c.factor)
            .max()
            .unwrap_or(Decimal::ZERO);
        best_symbol * best_factor
    }

    /// Expected multiplier of a winning draw
    pub fn expected_win_multiplier(&self) -> Decimal {
        let symbol_weight: u32 = self.symbols.iter().map(|s| s.weight).sum();
        let class_weight: u32 = self.win_classes.iter().map(|c| c.weight).sum();
        if symbol_weight == 0 || class_weight == 0 {
            return Decimal::ZERO;
        }
        let symbol_mean = self
            .symbols
            .iter()
            .map(|s| s.multiplier * Decimal::from(s.weight))
            .sum::<Decimal>()
            / Decimal::from(symbol_weight);
        let factor_mean = self
            .win_classes
            .iter()
            .map(|c| c.factor * Decimal::from(c.weight))
            .sum::<Decimal>()
            / Decimal::from(class_weight);
        symbol_mean * factor_mean
    }

    /// Percentage of draws that must win for the table to return `rtp`
    pub fn hit_threshold(&self, rtp: Decimal) -> Decimal {
        let expected = self.expected_win_multiplier();
        if expected.is_zero() {
            return Decimal::ZERO;
        }
        rtp / expected
    }

    /// Match a final reel result against the table
    ///
    /// Returns the symbol with the longest run and the largest class that
    /// run satisfies, or `None` when nothing pays.
    pub fn evaluate(&self, reels: &[usize]) -> Option<LineMatch> {
        let mut counts = vec![0usize; self.symbols.len()];
        for &s in reels {
            if let Some(c) = counts.get_mut(s) {
                *c += 1;
            }
        }

        let (symbol, &count) = counts.iter().enumerate().max_by_key(|(_, c)| **c)?;

        self.win_classes
            .iter()
            .enumerate()
            .filter(|(_, class)| class.matches <= count)
            .max_by_key(|(_, class)| class.matches)
            .map(|(class, _)| LineMatch { symbol, class })
    }

    pub fn multiplier_of(&self, line: LineMatch) -> Decimal {
        self.symbols[line.symbol].multiplier * self.win_classes[line.class].factor
    }

    pub fn validate(&self, rtp: Decimal) -> Result<(), ConfigValidationError> {
        if self.reels == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "pay table needs at least one reel".to_string(),
            ));
        }
        if self.symbols.len() < 2 {
            return Err(ConfigValidationError::InvalidValue(
                "pay table needs at least two symbols".to_string(),
            ));
        }
        if self.symbols.iter().any(|s| s.weight == 0 || s.multiplier <= Decimal::ZERO) {
            return Err(ConfigValidationError::InvalidValue(
                "symbol weights and multipliers must be positive".to_string(),
            ));
        }
        if self.win_classes.is_empty() {
            return Err(ConfigValidationError::InvalidValue(
                "pay table needs at least one win class".to_string(),
            ));
        }
        if self
            .win_classes
            .iter()
            .any(|c| c.weight == 0 || c.factor <= Decimal::ZERO || c.matches > self.reels)
        {
            return Err(ConfigValidationError::InvalidValue(
                "win classes need positive weight and factor and at most one match per reel"
                    .to_string(),
            ));
        }

        let min_match = self.min_match();
        if min_match < 2 {
            return Err(ConfigValidationError::InvalidValue(
                "a win class must need at least two matching symbols".to_string(),
            ));
        }
        // One qualifying run per result keeps evaluation unambiguous
        if self.reels >= 2 * min_match {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "{} reels allow two paying runs of {}",
                self.reels, min_match
            )));
        }
        // A losing line must exist for the loss draw to terminate
        if self.symbols.len() * (min_match - 1) < self.reels {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "{} symbols cannot fill {} reels without a paying run",
                self.symbols.len(),
                self.reels
            )));
        }

        if rtp <= Decimal::ZERO || rtp > dec!(100) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "rtp {} must be in (0, 100]",
                rtp
            )));
        }
        let threshold = self.hit_threshold(rtp);
        if threshold > dec!(100) {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "rtp {} needs a hit rate of {}% which exceeds 100%",
                rtp,
                threshold.round_dp(2)
            )));
        }
        Ok(())
    }

    pub(crate) fn hit_threshold_f64(&self, rtp: Decimal) -> f64 {
        self.hit_threshold(rtp).to_f64().unwrap_or(0.0)
    }
}

/// Result of one server-side spin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinOutcome {
    pub symbols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_class: Option<String>,
    pub multiplier: Decimal,
    pub win_amount: Decimal,
}

impl SpinOutcome {
    /// A paying line was matched, even if a tiny stake truncates its payout to zero
    pub fn is_win(&self) -> bool {
        self.winning_symbol.is_some()
    }
}
