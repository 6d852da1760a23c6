//! CLI: generates a bill from a Daywise/Netwise export pair and prints a
//! summary, or the full JSON payload with `--json`.

use std::env;
use std::fs::File;

use chrono::NaiveDate;
use fno_billing::{Bill, FileRole, RateCard, RawExport};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    let positional: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();
    let [account, date, day_path, net_path] = positional.as_slice() else {
        println!("Usage: fno-billing <account> <dd-mm-yyyy> <daywise.csv> <netwise.csv> [--json]");
        return Ok(());
    };

    let trade_date = NaiveDate::parse_from_str(date, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))?;
    let card = RateCard::load_default()?;
    let daywise = RawExport::from_reader(File::open(day_path)?, FileRole::Daywise)?;
    let netwise = RawExport::from_reader(File::open(net_path)?, FileRole::Netwise)?;

    let bill = Bill::generate(account, trade_date, &daywise, &netwise, &card)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bill)?);
        return Ok(());
    }

    println!("Account {} — {}", bill.account, bill.trade_date);
    println!("Rate card: {}", card.source());
    for section in &bill.sections {
        println!("\n{} {}", section.exchange, section.segment);
        for line in &section.lines {
            println!(
                "  {:<28} {:>14}  ({} on {})",
                line.label, line.amount, line.rate, line.basis
            );
        }
        println!("  {:<28} {:>14}", "Subtotal", section.subtotal);
    }
    println!("\nTotal charges: {}", bill.charges_total);
    println!("Net traded amount: {}", bill.net_amount);
    println!("Total payable: {}", bill.total_payable);
    for warning in &bill.warnings {
        println!(
            "Warning: {} {} diverges by {} (tolerance {})",
            warning.exchange, warning.segment, warning.difference, warning.tolerance
        );
    }
    Ok(())
}
