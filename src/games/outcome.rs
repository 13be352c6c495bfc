//! RTP-weighted outcome generation
//!
//! A spin first decides whether it is a winning draw: a uniform value in
//! `[0, 100)` below the table's hit threshold wins. The threshold is
//! `rtp / E[multiplier | win]`, so a higher RTP wins more often and the
//! long-run payout ratio converges to the configured RTP.
//!
//! Winning draws pick a symbol by weight, then a win class by weight, place
//! the symbol the class's number of times, fill the rest with other symbols
//! and shuffle. Losing draws fill every reel uniformly and re-roll reels
//! until no symbol forms a paying run.

use super::types::{PayTable, SpinOutcome};
use crate::common::types::truncate_money;
use crate::config::ConfigValidationError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

/// Stateless generator bound to one pay table and RTP
#[derive(Debug, Clone)]
pub struct OutcomeGenerator {
    table: PayTable,
    rtp: Decimal,
    hit_threshold: f64,
    symbol_dist: WeightedIndex<u32>,
    class_dist: WeightedIndex<u32>,
}

impl OutcomeGenerator {
    pub fn new(table: PayTable, rtp: Decimal) -> Result<Self, ConfigValidationError> {
        table.validate(rtp)?;

        let symbol_dist = WeightedIndex::new(table.symbols.iter().map(|s| s.weight))
            .map_err(|e| ConfigValidationError::InvalidValue(format!("symbol weights: {}", e)))?;
        let class_dist = WeightedIndex::new(table.win_classes.iter().map(|c| c.weight))
            .map_err(|e| ConfigValidationError::InvalidValue(format!("win class weights: {}", e)))?;
        let hit_threshold = table.hit_threshold_f64(rtp);

        Ok(Self {
            table,
            rtp,
            hit_threshold,
            symbol_dist,
            class_dist,
        })
    }

    pub fn table(&self) -> &PayTable {
        &self.table
    }

    pub fn rtp(&self) -> Decimal {
        self.rtp
    }

    /// Probability of a winning draw, in percent
    pub fn hit_threshold(&self) -> f64 {
        self.hit_threshold
    }

    /// Produce symbols and win amount for one spin
    pub fn generate<R: Rng + ?Sized>(&self, stake: Decimal, rng: &mut R) -> SpinOutcome {
        let draw: f64 = rng.gen_range(0.0..100.0);
        let reels = if draw < self.hit_threshold {
            self.winning_reels(rng)
        } else {
            self.losing_reels(rng)
        };
        self.outcome_for(&reels, stake)
    }

    fn winning_reels<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let symbol = self.symbol_dist.sample(rng);
        let class = &self.table.win_classes[self.class_dist.sample(rng)];
        let others = self.table.symbols.len() - 1;

        let mut reels = vec![symbol; self.table.reels];
        for slot in reels.iter_mut().skip(class.matches) {
            // Uniform over every symbol except the winning one
            let pick = rng.gen_range(0..others);
            *slot = if pick >= symbol { pick + 1 } else { pick };
        }
        reels.shuffle(rng);
        reels
    }

    fn losing_reels<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let symbols = self.table.symbols.len();
        let min_match = self.table.min_match();

        let mut reels: Vec<usize> = (0..self.table.reels)
            .map(|_| rng.gen_range(0..symbols))
            .collect();
        while has_run(&reels, symbols, min_match) {
            let pos = rng.gen_range(0..reels.len());
            reels[pos] = rng.gen_range(0..symbols);
        }
        reels
    }

    fn outcome_for(&self, reels: &[usize], stake: Decimal) -> SpinOutcome {
        let symbols = reels
            .iter()
            .map(|&s| self.table.symbols[s].name.clone())
            .collect();

        match self.table.evaluate(reels) {
            Some(line) => {
                let multiplier = self.table.multiplier_of(line);
                SpinOutcome {
                    symbols,
                    winning_symbol: Some(self.table.symbols[line.symbol].name.clone()),
                    win_class: Some(self.table.win_classes[line.class].name.clone()),
                    multiplier,
                    win_amount: truncate_money(stake * multiplier),
                }
            }
            None => SpinOutcome {
                symbols,
                winning_symbol: None,
                win_class: None,
                multiplier: Decimal::ZERO,
                win_amount: truncate_money(Decimal::ZERO),
            },
        }
    }
}

fn has_run(reels: &[usize], symbols: usize, min_match: usize) -> bool {
    let mut counts = vec![0usize; symbols];
    for &s in reels {
        counts[s] += 1;
        if counts[s] >= min_match {
            return true;
        }
    }
    false
}
