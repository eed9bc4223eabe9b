//! # Seed Data Generator
//!
//! Populates a development database with branches, products and opening
//! stock.
//!
//! ## Usage
//! ```bash
//! # Default: ./duka_dev.db, 20 units of everything per branch
//! cargo run -p duka-db --bin seed
//!
//! # Custom opening stock
//! cargo run -p duka-db --bin seed -- --stock 50
//!
//! # Specify database path
//! cargo run -p duka-db --bin seed -- --db ./data/duka.db
//! ```
//!
//! ## Generated Data
//! - Four branches (Nairobi CBD, Westlands, Mombasa Road, Kisumu)
//! - Household staples with selling price, price floor and threshold
//! - Opening stock at every branch, written through the restock path so
//!   each row carries a `STOCK_RESTOCKED` audit entry

use chrono::Utc;
use std::env;
use tracing_subscriber::EnvFilter;

use duka_core::{Actor, Branch, Money, Product, Role};
use duka_db::{Database, DbConfig, DEFAULT_LOG_FILTER};

/// Branch directory: (id, name)
const BRANCHES: &[(&str, &str)] = &[
    ("nbo-cbd", "Nairobi CBD"),
    ("nbo-westlands", "Westlands"),
    ("msa-road", "Mombasa Road"),
    ("ksm-main", "Kisumu"),
];

/// Catalog: (sku, name, selling price KES, minimum price KES, low-stock threshold)
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("SUG-1KG", "Sugar 1kg", 180, 160, 10),
    ("UNG-2KG", "Unga 2kg", 250, 220, 10),
    ("RIC-1KG", "Rice Pishori 1kg", 260, 230, 8),
    ("OIL-1L", "Cooking Oil 1L", 390, 350, 6),
    ("MLK-500", "Milk 500ml", 65, 55, 24),
    ("BRD-400", "Bread 400g", 70, 60, 12),
    ("TEA-250", "Tea Leaves 250g", 160, 140, 6),
    ("SOP-800", "Bar Soap 800g", 210, 185, 6),
    ("SLT-1KG", "Salt 1kg", 50, 40, 10),
    ("EGG-TRY", "Eggs Tray (30)", 480, 430, 4),
    ("MAT-10", "Matches 10pk", 40, 32, 10),
    ("KER-1L", "Paraffin 1L", 170, 150, 8),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut stock: i64 = 20;
    let mut db_path = String::from("./duka_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Duka Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --stock <N>    Opening units per product per branch (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./duka_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Duka Seed Data Generator");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Opening stock: {} per product per branch", stock);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing catalog
    let existing = db.catalog().count_products().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let start = std::time::Instant::now();

    for (id, name) in BRANCHES {
        db.catalog()
            .insert_branch(&Branch {
                id: id.to_string(),
                name: name.to_string(),
                is_active: true,
                created_at: now,
            })
            .await?;
    }
    println!("✓ Created {} branches", BRANCHES.len());

    for product in PRODUCTS.iter().map(|p| generate_product(*p)) {
        db.catalog().insert_product(&product).await?;
    }
    println!("✓ Created {} products", PRODUCTS.len());

    if stock > 0 {
        let seeder = Actor::new("seed", Role::Admin, None);
        let mut rows = 0;
        for (branch_id, _) in BRANCHES {
            for (sku, ..) in PRODUCTS {
                let product_id = product_id(sku);
                if let Err(e) = db.inventory().restock(&product_id, branch_id, stock, &seeder).await {
                    eprintln!("Failed to stock {} at {}: {}", sku, branch_id, e);
                    continue;
                }
                rows += 1;
            }
        }
        println!("✓ Stocked {} inventory rows", rows);
    }

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());
    println!("  Audit entries: {}", db.audit().count().await?);

    Ok(())
}

/// Stable product id derived from the SKU.
fn product_id(sku: &str) -> String {
    format!("prod-{}", sku.to_lowercase())
}

/// Builds a catalog product from a seed row.
fn generate_product((sku, name, price, min_price, threshold): (&str, &str, i64, i64, i64)) -> Product {
    let now = Utc::now();
    Product {
        id: product_id(sku),
        sku: sku.to_string(),
        name: name.to_string(),
        selling_price_cents: Money::from_major(price).cents(),
        min_price_cents: Money::from_major(min_price).cents(),
        low_stock_threshold: threshold,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
