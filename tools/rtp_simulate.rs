//! RTP simulation
//!
//! Draws N spins from a layout's default pay table and reports the observed
//! return, hit rate and largest multiplier.

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Instant;
use wagering::games::{OutcomeGenerator, ReelLayout};

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Three,
    Five,
}

impl From<Layout> for ReelLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Three => ReelLayout::ThreeReel,
            Layout::Five => ReelLayout::FiveReel,
        }
    }
}

#[derive(Parser)]
#[command(name = "rtp-simulate")]
#[command(about = "Measure the payout of the outcome generator")]
struct Cli {
    #[arg(short, long, value_enum, default_value = "three")]
    layout: Layout,

    /// Target RTP in percent
    #[arg(short, long, default_value = "96.5")]
    rtp: String,

    #[arg(short = 'n', long, default_value = "1000000")]
    trials: u64,

    #[arg(short, long, default_value = "42")]
    seed: u64,

    #[arg(long, default_value = "1.00")]
    stake: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let rtp = Decimal::from_str(&cli.rtp)?;
    let stake = Decimal::from_str(&cli.stake)?;
    let layout = ReelLayout::from(cli.layout);

    let generator = OutcomeGenerator::new(layout.pay_table(), rtp)?;
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let started = Instant::now();
    let mut staked = Decimal::ZERO;
    let mut paid = Decimal::ZERO;
    let mut wins = 0u64;
    let mut max_multiplier = Decimal::ZERO;
    for _ in 0..cli.trials {
        let outcome = generator.generate(stake, &mut rng);
        staked += stake;
        paid += outcome.win_amount;
        if outcome.is_win() {
            wins += 1;
            max_multiplier = max_multiplier.max(outcome.multiplier);
        }
    }
    let elapsed = started.elapsed();

    let observed = if staked.is_zero() {
        Decimal::ZERO
    } else {
        paid / staked * Decimal::ONE_HUNDRED
    };
    let hit_rate = wins as f64 / cli.trials.max(1) as f64 * 100.0;

    println!("layout          {}", layout);
    println!("trials          {}", cli.trials);
    println!("seed            {}", cli.seed);
    println!("target rtp      {}%", rtp);
    println!("observed rtp    {:.3}%", observed.to_f64().unwrap_or(0.0));
    println!(
        "hit rate        {:.3}% (threshold {:.3}%)",
        hit_rate,
        generator.hit_threshold()
    );
    println!("max multiplier  {}x", max_multiplier);
    println!(
        "throughput      {:.0} spins/s",
        cli.trials as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}
