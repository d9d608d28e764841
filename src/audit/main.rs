//! Standalone consistency audit for user record files.
//!
//! Checks a record file for duplicate referral codes, dangling referrers,
//! stage data gaps and inflated referral counts.

use std::process::ExitCode;

use clap::Parser;

use promo_task_bot::store::{TaskStage, UserRecord, audit_records, read_records};

/// User record auditor.
#[derive(Parser, Debug)]
#[command(name = "audit_store")]
#[command(about = "Audits a promo bot user record file for broken invariants")]
#[command(version)]
struct Args {
    /// Path to the JSON record file to audit.
    #[arg(short, long, default_value = "users.json")]
    file: String,

    /// Show per-stage counts and balance totals.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    println!("Auditing: {}\n", args.file);

    let records = match read_records(&args.file).await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("✗ Failed to load records: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.verbose {
        print_summary(&records);
    }

    let issues = audit_records(&records);
    if issues.is_empty() {
        println!("✓ All {} records are consistent!", records.len());
        return ExitCode::SUCCESS;
    }

    for issue in &issues {
        println!("  ✗ {issue}");
    }
    println!();
    println!(
        "✗ Audit failed: {} issue(s) in {} records",
        issues.len(),
        records.len()
    );

    ExitCode::FAILURE
}

fn print_summary(records: &[UserRecord]) {
    let stages = [
        TaskStage::Start,
        TaskStage::TelegramDone,
        TaskStage::InstagramDone,
        TaskStage::YoutubeDone,
    ];
    for stage in stages {
        let count = records.iter().filter(|r| r.task_stage == stage).count();
        println!("  {:<16} {count}", stage.as_str());
    }

    let total: u64 = records.iter().map(|r| r.balance).sum();
    let referred = records.iter().filter(|r| r.referred_by.is_some()).count();
    println!("  total balance    {total}");
    println!("  referred users   {referred}");
    println!();
}
