//! # Seed Data
//!
//! Installs the default transaction-type prefixes and a few sample branches.
//!
//! ## Usage
//! ```bash
//! # Seed ./docseq_dev.db
//! cargo run -p docseq-db --bin seed
//!
//! # Specify database path, prefixes only
//! cargo run -p docseq-db --bin seed -- --db ./data/docseq.db --no-branches
//! ```
//!
//! Prefixes are upserted, so running the seed twice is harmless and resets
//! edited codes back to the defaults below.

use docseq_core::Branch;
use docseq_db::{Database, DbConfig};
use std::env;

/// Transaction type → prefix code.
const PREFIXES: &[(&str, &str)] = &[
    ("Purchase Order", "PO"),
    ("Purchase Return", "PR"),
    ("Goods Receipt", "GR"),
    ("Stock Transfer", "ST"),
    ("Stock Audit", "SA"),
    ("Stock Adjustment", "SJ"),
    ("Sales Order", "SO"),
    ("Sales Invoice", "INV"),
];

/// (id, name, initial)
const BRANCHES: &[(i64, &str, &str)] = &[
    (1, "Head Office", "HO"),
    (2, "Bandung", "BDG"),
    (3, "Jakarta", "JKT"),
    (4, "Surabaya", "SBY"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./docseq_dev.db");
    let mut with_branches = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--no-branches" => with_branches = false,
            "--help" | "-h" => {
                println!("docseq Seed Data");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./docseq_dev.db)");
                println!("      --no-branches  Only seed prefixes");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 docseq Seed Data");
    println!("===================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    for (transaction_type, prefix_code) in PREFIXES {
        let prefix = db.prefixes().upsert(transaction_type, prefix_code).await?;
        println!("  {:<18} → {} (id {})", prefix.transaction_type, prefix.prefix_code, prefix.id);
    }

    if with_branches {
        println!();
        for (id, name, initial) in BRANCHES {
            let branch = Branch {
                id: *id,
                name: name.to_string(),
                initial: initial.to_string(),
                is_active: true,
            };
            db.branches().upsert(&branch).await?;
            println!("  branch {:<3} {:<12} {}", id, name, initial);
        }
    }

    println!();
    println!(
        "✓ Seed complete: {} prefixes, {} branches",
        db.prefixes().count().await?,
        db.branches().list_active().await?.len()
    );

    Ok(())
}
