//! Backtest Runner CLI
//!
//! Offline entrypoint for replaying stored recommendations against stored
//! outcomes without going through the HTTP surface.
//!
//! ```bash
//! cargo run --bin backtest_run -- \
//!   --db ./bidpilot.db \
//!   --start 2025-06-01 --end 2025-06-30 \
//!   --granularity weekly --margin 0.3 \
//!   --output results.json
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use bidpilot_backend::backtest::models::{BacktestParams, Granularity};
use bidpilot_backend::backtest::BacktestEngine;
use bidpilot_backend::warehouse::Warehouse;

#[derive(Debug, Parser)]
#[command(name = "backtest_run", about = "Replay stored recommendations against outcomes")]
struct Args {
    /// Warehouse sqlite path.
    #[arg(long, env = "DATABASE_PATH", default_value = "./bidpilot.db")]
    db: String,

    /// Range start, YYYY-MM-DD.
    #[arg(long)]
    start: NaiveDate,

    /// Range end, YYYY-MM-DD (inclusive).
    #[arg(long)]
    end: NaiveDate,

    /// Optional ASIN filter.
    #[arg(long)]
    asin: Option<String>,

    /// Optional campaign filter.
    #[arg(long)]
    campaign: Option<String>,

    /// daily | weekly
    #[arg(long, default_value = "daily")]
    granularity: String,

    /// Product margin for the profit-gain estimate.
    #[arg(long, default_value_t = 0.3)]
    margin: f64,

    /// Write the full result JSON here instead of stdout.
    #[arg(long)]
    output: Option<String>,

    /// Persist the result into backtest_executions.
    #[arg(long, default_value_t = false)]
    persist: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bidpilot_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.end >= args.start, "end date before start date");
    anyhow::ensure!(
        (args.end - args.start).num_days() <= 365,
        "range exceeds 365 days"
    );

    let granularity = Granularity::parse(&args.granularity)
        .context("granularity must be daily or weekly")?;

    let warehouse = Warehouse::open(&args.db)?;
    let recommendations = warehouse.load_bid_recommendations_in_range(
        args.start,
        args.end,
        args.asin.as_deref(),
        args.campaign.as_deref(),
    )?;
    let performance = warehouse.load_daily_performance(args.start, args.end)?;

    let mut params = BacktestParams::new(args.start, args.end);
    params.asin = args.asin.clone();
    params.campaign_id = args.campaign.clone();
    params.granularity = granularity;
    params.profit_margin = args.margin;

    let execution_id = uuid::Uuid::new_v4().to_string();
    let engine = BacktestEngine::new(params);
    let result = engine.run(&execution_id, &recommendations, &performance)?;

    if args.persist {
        warehouse.insert_backtest_result(&result)?;
    }

    eprintln!(
        "matched={} accuracy={:.1}% acos {:.2}% -> {:.2}% profit_gain={:.0} JPY",
        result.metadata.matched_rows,
        result.accuracy.accuracy_rate * 100.0,
        result.actual.acos * 100.0,
        result.simulated.acos * 100.0,
        result.improvement.estimated_profit_gain_jpy,
    );

    let json = serde_json::to_string_pretty(&result)?;
    match args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(&path)?);
            writer.write_all(json.as_bytes())?;
            eprintln!("result written to {path}");
        }
        None => println!("{json}"),
    }

    Ok(())
}
