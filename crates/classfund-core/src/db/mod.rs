//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `classes` - Users, classrooms, memberships, roles, fund accounts
//! - `cycles` - Fee cycles and invoice generation
//! - `invoices` - Invoice reads and status recomputation
//! - `payments` - Payment submissions, verification verdicts, invalidation
//! - `expenses` - Expense records
//! - `ledger` - Ledger reconstruction and fund summaries
//! - `notifications` - The persisted notification sink

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod classes;
mod cycles;
mod expenses;
mod invoices;
mod ledger;
mod notifications;
mod payments;

pub use classes::{ClassSummary, MemberRow};
pub use cycles::GenerateInvoicesResult;
pub use expenses::ExpenseRow;
pub use invoices::{InvoiceDetail, MyInvoiceRow, UnpaidMemberRow};
pub use ledger::{CycleReport, FundSummary, LedgerEntry, LedgerEntryKind, LedgerFilter, LedgerReport};
pub use payments::{PaymentContext, PaymentListRow};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional SQLite datetime column
pub(crate) fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

/// Parse an optional SQLite date column
pub(crate) fn parse_opt_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing).
    ///
    /// Note: uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/classfund_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers.
            -- The invoice recompute transactions rely on SQLite's
            -- single-writer serialization.
            PRAGMA journal_mode = WAL;

            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Users (authentication lives outside this schema)
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Classes (fund-sharing groups)
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,                 -- invite code
                owner_id INTEGER NOT NULL REFERENCES users(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_classes_owner ON classes(owner_id);

            -- Class memberships: one row per (class, user), carrying the role
            CREATE TABLE IF NOT EXISTS class_members (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role TEXT NOT NULL DEFAULT 'member',       -- owner, treasurer, member
                status TEXT NOT NULL DEFAULT 'active',     -- active, left
                joined_at DATETIME,
                UNIQUE(class_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_class_members_user ON class_members(user_id);
            CREATE INDEX IF NOT EXISTS idx_class_members_role ON class_members(class_id, role);

            -- Fund accounts: bank routing details, at most one per class
            CREATE TABLE IF NOT EXISTS fund_accounts (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL UNIQUE REFERENCES classes(id) ON DELETE CASCADE,
                bank_code TEXT NOT NULL,
                account_number TEXT NOT NULL,
                account_name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Fee cycles
            CREATE TABLE IF NOT EXISTS fee_cycles (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                term TEXT,
                amount_per_member INTEGER NOT NULL CHECK (amount_per_member >= 0),
                due_date DATE,
                status TEXT NOT NULL DEFAULT 'draft',      -- draft, active, closed
                allow_late BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_fee_cycles_class ON fee_cycles(class_id);
            CREATE INDEX IF NOT EXISTS idx_fee_cycles_status ON fee_cycles(status);

            -- Invoices: one member's obligation for one cycle
            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY,
                fee_cycle_id INTEGER NOT NULL REFERENCES fee_cycles(id) ON DELETE CASCADE,
                member_id INTEGER NOT NULL REFERENCES class_members(id) ON DELETE CASCADE,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'unpaid',     -- unpaid, submitted, verified, paid
                paid_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(fee_cycle_id, member_id)
            );

            CREATE INDEX IF NOT EXISTS idx_invoices_member ON invoices(member_id);
            CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);

            -- Payments. Three parallel field layers (submission, OCR,
            -- auto-verification, invalidation) share the row so the audit
            -- trail of a payment is one SELECT.
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY,
                invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
                payer_id INTEGER NOT NULL REFERENCES class_members(id) ON DELETE CASCADE,
                amount INTEGER NOT NULL,
                method TEXT NOT NULL DEFAULT 'bank',       -- bank, momo, zalopay, cash
                txn_ref TEXT,
                proof_path TEXT,                           -- image store reference
                status TEXT NOT NULL DEFAULT 'submitted',  -- submitted, verified, rejected, invalid
                verified_by INTEGER REFERENCES users(id),  -- NULL for auto-verification
                verified_at DATETIME,

                ocr_raw TEXT,
                ocr_amount INTEGER,
                ocr_method TEXT,
                ocr_txn_ref TEXT,
                ocr_confidence INTEGER,

                auto_verified BOOLEAN NOT NULL DEFAULT 0,
                verify_reason_code TEXT,
                verify_reason_detail TEXT,

                invalidated_at DATETIME,
                invalidated_by INTEGER REFERENCES users(id),
                invalid_reason TEXT,
                invalid_note TEXT,

                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);
            CREATE INDEX IF NOT EXISTS idx_payments_payer ON payments(payer_id);
            CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
            CREATE INDEX IF NOT EXISTS idx_payments_verified_at ON payments(verified_at);

            -- Expenses
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                fee_cycle_id INTEGER REFERENCES fee_cycles(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                amount INTEGER NOT NULL CHECK (amount >= 0),
                note TEXT,
                spent_at DATE,
                receipt_path TEXT,                         -- image store reference
                created_by INTEGER NOT NULL REFERENCES users(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_class ON expenses(class_id);
            CREATE INDEX IF NOT EXISTS idx_expenses_cycle ON expenses(fee_cycle_id);

            -- Notifications (the persisted notification sink)
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                sent_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
