//! market-runner: headless operator runner for the marketplace core.
//!
//! Usage:
//!   market-runner --seed 12345 --vendors 25 --db market.db
//!   market-runner --seed 7 --json               (settlement report as JSON)
//!   market-runner --db market.db --ipc-mode     (JSON-lines requests on stdin)

use anyhow::Result;
use chrono::{DateTime, Utc};
use marketplace_core::{
    api::ApiResponse,
    config::MarketConfig,
    demo::{seed_marketplace, DemoSummary},
    engine::Marketplace,
    error::ErrorKind,
    payout_subsystem::PayoutOutcome,
    store::QueueStats,
    types::{Amount, Page, Timestamp},
};
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let vendor_count = parse_arg(&args, "--vendors", 12usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let json_report = args.iter().any(|a| a == "--json");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");

    if !ipc_mode && !json_report {
        println!("market-runner");
        println!("  seed:      {seed}");
        println!("  vendors:   {vendor_count}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = match MarketConfig::load(data_dir) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{e:#}; falling back to built-in defaults");
            MarketConfig::default_test()
        }
    };
    let market = Marketplace::open(db, config)?;

    if ipc_mode {
        run_ipc_loop(&market)?;
    } else {
        let summary = seed_marketplace(&market, seed, vendor_count)?;
        settle(&market, &summary)?;
        let report = RunReport::collect(&market, seed, &summary)?;
        if json_report {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
    }
    Ok(())
}

/// Serve one `ApiRequest` per input line, one `ApiResponse` per output line.
/// A line holding only `quit` ends the session.
fn run_ipc_loop(market: &Marketplace) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if handle.read_line(&mut buffer)? == 0 {
            break; // EOF
        }
        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        let response: ApiResponse = market.handle_json(line);
        if response.error_kind() == Some(ErrorKind::Infrastructure) {
            log::error!("store fault while serving: {line}");
        }
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}

/// One settlement cycle over the seeded window: statement per vendor,
/// finalize, batch payouts for everything due, confirm them.
fn settle(market: &Marketplace, summary: &DemoSummary) -> Result<()> {
    let statements = market.statements();
    for vendor_id in &summary.vendor_ids {
        let statement = statements.generate(vendor_id, summary.period_start, summary.period_end)?;
        let outcome = market.finalize_statement(&statement.statement_id)?;
        if outcome.flagged_non_positive {
            log::warn!("vendor {vendor_id} has nothing to pay out this period");
        }
    }

    let page = Page::first(market.config().queues.max_page_size);
    let due: Vec<String> = market
        .get_payout_due_queue(page)?
        .items
        .into_iter()
        .filter(|row| row.open_payout_status.is_none() && row.statement.net_amount > Amount::ZERO)
        .map(|row| row.statement.statement_id)
        .collect();
    let batch = market.create_batch_payouts(&due)?;
    for skip in &batch.skipped {
        log::warn!("skipped {}: {}", skip.id, skip.message);
    }

    for (n, payout) in batch.payouts.iter().enumerate() {
        market.complete_payout(
            &payout.payout_id,
            PayoutOutcome::Completed {
                reference: format!("UTR{:010}", n + 1),
            },
        )?;
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct RunReport {
    seed: u64,
    generated_at: DateTime<Utc>,
    period_start: Timestamp,
    period_end: Timestamp,
    categories: usize,
    vendors: usize,
    products: usize,
    rules: usize,
    sales: usize,
    payouts: usize,
    paid_out: Amount,
    queues: QueueStats,
}

impl RunReport {
    fn collect(market: &Marketplace, seed: u64, summary: &DemoSummary) -> Result<Self> {
        let mut paid_out = Amount::ZERO;
        let mut payouts = 0usize;
        for vendor_id in &summary.vendor_ids {
            for payout in market.list_payouts(vendor_id)? {
                paid_out = paid_out
                    .checked_add(payout.amount)
                    .ok_or_else(|| anyhow::anyhow!("paid-out total is out of range"))?;
                payouts += 1;
            }
        }
        Ok(Self {
            seed,
            generated_at: Utc::now(),
            period_start: summary.period_start,
            period_end: summary.period_end,
            categories: summary.category_ids.len(),
            vendors: summary.vendor_ids.len(),
            products: summary.product_ids.len(),
            rules: summary.rule_count,
            sales: summary.sale_count,
            payouts,
            paid_out,
            queues: market.get_queue_stats()?,
        })
    }
}

fn print_report(report: &RunReport) {
    println!("=== SETTLEMENT SUMMARY ===");
    println!("  period:          {} .. {}", report.period_start, report.period_end);
    println!("  categories:      {}", report.categories);
    println!("  vendors:         {}", report.vendors);
    println!("  products:        {}", report.products);
    println!("  rules:           {}", report.rules);
    println!("  sales:           {}", report.sales);
    println!("  payouts:         {}", report.payouts);
    println!("  paid out:        {}", report.paid_out);
    println!();
    println!("=== QUEUES ===");
    println!("  pending vendors: {}", report.queues.pending_vendors);
    println!("  pending kyc:     {}", report.queues.pending_kyc);
    println!(
        "  payouts due:     {} ({})",
        report.queues.payouts_due, report.queues.payouts_due_amount
    );
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
