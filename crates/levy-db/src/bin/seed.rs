//! # Seed Data Generator
//!
//! Populates the database with a demo tax setup for development and runs
//! one computation against it.
//!
//! ## Usage
//! ```bash
//! # Seed ./levy_dev.db (or the path from levy.toml / LEVY_DB_PATH)
//! cargo run -p levy-db --bin seed
//!
//! # Specify database path
//! cargo run -p levy-db --bin seed -- --db ./data/levy.db
//!
//! # Use another config file
//! cargo run -p levy-db --bin seed -- --config ./levy.toml
//! ```
//!
//! ## Generated Data
//! - Region "UAE" with categories "1" (standard) and "2" (excise goods)
//! - VAT: 5% from 2018-01-01, 7% from 2023-01-01
//! - Excise: 50% from 2017-10-01, only for category "2"
//! - Tourism fee: fixed AED 1.50 per line via the `fixed_tax` method

use std::env;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use tracing_subscriber::EnvFilter;

use levy_core::{
    Currency, ItemType, Money, Percentage, TaxDefinition, TaxRate, TaxRegion, TaxType,
};
use levy_db::{LevyConfig, TaxEngine, TaxRequest};

/// Demo tax types: (name, display order, method kind, categories, rates).
const TAX_TYPES: &[(&str, i32, &str, &[&str], &[(u32, (i32, u32, u32))])] = &[
    ("VAT", 1, "percentage", &["1", "2"], &[(500, (2018, 1, 1)), (700, (2023, 1, 1))]),
    ("Excise", 2, "percentage", &["2"], &[(5000, (2017, 10, 1))]),
    ("Tourism Fee", 3, "fixed_tax", &["1"], &[(0, (2018, 1, 1))]),
];

/// Fixed tourism fee in fils.
const TOURISM_FEE_MINOR: i64 = 150;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,levy_db=debug,sqlx=warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Levy Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: from config)");
                println!("  -c, --config <PATH>    Config file path (default: ./levy.toml)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LevyConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    config.currency.base = "AED".to_string();

    println!("🌱 Levy Seed Data Generator");
    println!("===========================");
    println!("Database: {}", config.database.path.display());
    println!();

    let engine = TaxEngine::open(&config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = engine.database().regions().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} regions", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Region
    let region = TaxRegion::new("UAE");
    engine.save_region(&region).await?;
    println!("✓ Region {}", region.name);

    // Fixed amount for the tourism fee
    let mut fixed = engine
        .database()
        .tax_methods()
        .get_by_kind("fixed_tax")
        .await?
        .ok_or("fixed_tax method missing")?;
    fixed.fixed_amount_minor = TOURISM_FEE_MINOR;
    engine.save_tax_method(&fixed).await?;

    // Types, rates, definitions
    for (name, order, kind, categories, rates) in TAX_TYPES {
        let method = engine
            .database()
            .tax_methods()
            .get_by_kind(kind)
            .await?
            .ok_or("tax method missing")?;

        let mut tax_type = TaxType::new(*name, &region.id);
        tax_type.display_order = *order;
        tax_type.set_tax_method(&method.id)?;
        engine.save_tax_type(&mut tax_type).await?;

        for (bps, (y, m, d)) in rates.iter() {
            let from = NaiveDate::from_ymd_opt(*y, *m, *d).ok_or("invalid date")?;
            let mut rate = TaxRate::new(tax_type.id.as_str(), Percentage::from_bps(*bps), from);
            engine.save_tax_rate(&mut rate).await?;
        }

        for category in categories.iter() {
            engine
                .save_definition(&TaxDefinition::new(*category, &region.id, &tax_type.id))
                .await?;
        }

        println!("✓ {} ({} rates, categories {:?})", name, rates.len(), categories);
    }

    // Sample computation
    println!();
    println!("Computing taxes for a sample GRN line...");

    let aed: Currency = "AED".parse()?;
    let item = ItemType {
        id: "energy-250".to_string(),
        name: "Energy Drink 250ml".to_string(),
        tax_category: "2".to_string(),
    };
    let request = TaxRequest {
        date: Utc::now().date_naive(),
        parent_id: "grn-demo/1",
        region_id: None,
        item_type: &item,
        quantity: 24,
        unit_cost: Money::from_minor(450, aed),
        local_currency: aed,
    };

    let applied = engine.compute_and_apply(&request).await?;
    for line in applied.plan.lines() {
        println!(
            "  {:<36} {:>6} {:>12}  status {}",
            line.type_id(),
            line.rate().to_string(),
            line.tax().to_string(),
            line.status().code()
        );
    }
    println!("  Net change: {}", applied.net_change);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
