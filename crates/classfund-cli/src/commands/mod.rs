//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use classfund_core::db::{Database, LedgerFilter};
use classfund_core::models::{CycleStatus, NewFeeCycle};
use classfund_core::storage::ImageStore;
use classfund_server::ServerConfig;

/// Open (and migrate) the database
fn open_db(db_path: &Path) -> Result<Database> {
    Database::new(&db_path.to_string_lossy())
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    let db = open_db(db_path)?;
    println!("Initialized database at {}", db.path());
    Ok(())
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    images_dir: Option<PathBuf>,
) -> Result<()> {
    let db = open_db(db_path)?;
    let store = ImageStore::new(images_dir.unwrap_or_else(ImageStore::default_root));

    let config = ServerConfig {
        require_auth: !no_auth,
        allowed_origins: std::env::var("CLASSFUND_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    };

    classfund_server::serve(db, store, host, port, config).await
}

/// Seed a small demo class: an owner, two members, a fund account, one
/// active cycle and its invoices. Safe to run repeatedly.
pub fn cmd_seed_demo(db_path: &Path) -> Result<()> {
    let db = open_db(db_path)?;

    let owner = match db.get_user_by_email("owner@example.com")? {
        Some(user) => user.id,
        None => db.create_user("Owner", "owner@example.com", None)?,
    };
    let sv1 = match db.get_user_by_email("sv1@example.com")? {
        Some(user) => user.id,
        None => db.create_user("SV1", "sv1@example.com", None)?,
    };
    let sv2 = match db.get_user_by_email("sv2@example.com")? {
        Some(user) => user.id,
        None => db.create_user("SV2", "sv2@example.com", None)?,
    };

    let class = match db.my_classes(owner)?.into_iter().find(|c| c.name == "CNTT K45") {
        Some(existing) => db.get_class(existing.id)?.expect("class listed but missing"),
        None => db.create_class("CNTT K45", owner)?,
    };
    db.join_class(class.id, sv1)?;
    db.join_class(class.id, sv2)?;

    db.upsert_fund_account(class.id, "VCB", "00112233", "CNTT K45")?;

    let cycle = match db
        .list_fee_cycles(class.id)?
        .into_iter()
        .find(|c| c.name == "Quy HK1/2025")
    {
        Some(existing) => existing,
        None => db.create_fee_cycle(&NewFeeCycle {
            class_id: class.id,
            name: "Quy HK1/2025".into(),
            term: Some("HK1 2025".into()),
            amount_per_member: 200_000,
            due_date: None,
            status: CycleStatus::Active,
            allow_late: true,
        })?,
    };
    let generated = db.generate_invoices(cycle.id, None)?;

    println!(
        "Seeded class '{}' (code {}) with {} members, cycle '{}' ({} invoices created, {} existing)",
        class.name,
        class.code,
        db.class_members(class.id)?.len(),
        cycle.name,
        generated.created,
        generated.skipped,
    );
    Ok(())
}

pub fn cmd_ledger(
    db_path: &Path,
    class_id: i64,
    cycle: Option<i64>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let db = open_db(db_path)?;

    let parse_date = |raw: &str| {
        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
    };
    let filter = LedgerFilter {
        fee_cycle_id: cycle,
        from: from.map(parse_date).transpose()?,
        to: to.map(parse_date).transpose()?,
    };

    let report = db.ledger(class_id, &filter)?;

    println!();
    println!("📒 Ledger for class {}", class_id);
    println!("   ─────────────────────────────────────────────────────────────");
    for item in &report.items {
        let sign = if item.is_income { '+' } else { '-' };
        println!(
            "   {}  {:<16} {}{:>12}  {:>12}  {}",
            item.occurred_at.format("%Y-%m-%d %H:%M"),
            item.kind.as_str(),
            sign,
            item.amount,
            item.balance_after,
            item.note,
        );
    }
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Income:    {:>12}", report.total_income);
    println!(
        "   Expense:   {:>12}  (of which reversals: {})",
        report.total_expense, report.invalid_total
    );
    println!("   Balance:   {:>12}", report.closing_balance);
    Ok(())
}

pub fn cmd_status(db_path: &Path) -> Result<()> {
    println!();
    println!("📊 Classfund Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = std::fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let db = open_db(db_path)?;
    let conn = db.conn()?;
    let count = |table: &str| -> Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .context("count query failed")
    };

    println!();
    println!("   Classes: {}", count("classes")?);
    println!("   Members: {}", count("class_members")?);
    println!("   Fee cycles: {}", count("fee_cycles")?);
    println!("   Invoices: {}", count("invoices")?);
    println!("   Payments: {}", count("payments")?);
    println!("   Expenses: {}", count("expenses")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_demo_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.db");

        cmd_seed_demo(&path).unwrap();
        cmd_seed_demo(&path).unwrap();

        let db = open_db(&path).unwrap();
        let owner = db.get_user_by_email("owner@example.com").unwrap().unwrap();
        let classes = db.my_classes(owner.id).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].members_count, 3);

        let cycles = db.list_fee_cycles(classes[0].id).unwrap();
        assert_eq!(cycles.len(), 1);
    }
}
