//! Ledger reconstruction and fund summaries.
//!
//! Read-only: derives the chronological money trail of a class from three
//! independently-evolving record streams — verified payments, invalidated
//! payments, expenses. A reversed payment keeps its original income line AND
//! gains a reversal line, so the audit trail is complete while the net
//! balance stays correct.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};

/// What a ledger line represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// A payment that was verified at some point (income)
    Payment,
    /// A verified payment later marked invalid (deduction)
    InvalidPayment,
    /// An ordinary expense (deduction)
    Expense,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::InvalidPayment => "invalid_payment",
            Self::Expense => "expense",
        }
    }

    /// Same-timestamp tie-break: income settles before its own reversal,
    /// reversals before ordinary expenses
    fn rank(&self) -> u8 {
        match self {
            Self::Payment => 0,
            Self::InvalidPayment => 1,
            Self::Expense => 2,
        }
    }
}

/// One line of the reconstructed ledger
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: LedgerEntryKind,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub subject_name: String,
    pub subject_role: String,
    pub amount: i64,
    pub is_income: bool,
    pub balance_after: i64,
}

/// The full ledger with running balance and aggregate totals
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerReport {
    pub opening_balance: i64,
    pub total_income: i64,
    /// Includes reversal deductions
    pub total_expense: i64,
    /// The reversal subtotal, broken out for display
    pub invalid_total: i64,
    pub closing_balance: i64,
    pub items: Vec<LedgerEntry>,
}

/// Totals-only view of the same three streams
#[derive(Debug, Clone, serde::Serialize)]
pub struct FundSummary {
    pub total_income: i64,
    pub total_expense: i64,
    pub invalid_total: i64,
    pub balance: i64,
}

/// Optional narrowing of ledger/summary queries
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub fee_cycle_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Collection progress of one fee cycle
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleReport {
    pub class_id: i64,
    pub fee_cycle_id: i64,
    pub active_members: i64,
    pub amount_per_member: i64,
    pub expected_total: i64,
    pub unpaid_total: i64,
    pub submitted_total: i64,
    pub verified_total: i64,
    pub paid_total: i64,
    pub total_income: i64,
    pub total_expense: i64,
    pub balance: i64,
}

// A raw line before the running balance is applied
struct RawEntry {
    id: i64,
    kind: LedgerEntryKind,
    occurred_at: DateTime<Utc>,
    note: String,
    subject_name: String,
    subject_role: String,
    amount: i64,
}

impl Database {
    /// Reconstruct the ledger of a class.
    ///
    /// Lines are sorted by occurrence time; same-timestamp ties order income
    /// before reversal before expense, then by record id, so the output is
    /// deterministic. The running balance starts at zero.
    pub fn ledger(&self, class_id: i64, filter: &LedgerFilter) -> Result<LedgerReport> {
        let mut entries = self.income_lines(class_id, filter)?;
        entries.extend(self.reversal_lines(class_id, filter)?);
        entries.extend(self.expense_lines(class_id, filter)?);

        entries.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.kind.rank().cmp(&b.kind.rank()))
                .then(a.id.cmp(&b.id))
        });

        let mut running = 0i64;
        let mut total_income = 0i64;
        let mut total_expense = 0i64;
        let mut invalid_total = 0i64;

        let items = entries
            .into_iter()
            .map(|e| {
                let is_income = e.kind == LedgerEntryKind::Payment;
                if is_income {
                    running += e.amount;
                    total_income += e.amount;
                } else {
                    running -= e.amount;
                    total_expense += e.amount;
                    if e.kind == LedgerEntryKind::InvalidPayment {
                        invalid_total += e.amount;
                    }
                }
                LedgerEntry {
                    id: e.id,
                    kind: e.kind,
                    occurred_at: e.occurred_at,
                    note: e.note,
                    subject_name: e.subject_name,
                    subject_role: e.subject_role,
                    amount: e.amount,
                    is_income,
                    balance_after: running,
                }
            })
            .collect();

        Ok(LedgerReport {
            opening_balance: 0,
            total_income,
            total_expense,
            invalid_total,
            closing_balance: running,
            items,
        })
    }

    /// Totals without the per-line detail
    pub fn fund_summary(&self, class_id: i64, filter: &LedgerFilter) -> Result<FundSummary> {
        let report = self.ledger(class_id, filter)?;
        Ok(FundSummary {
            total_income: report.total_income,
            total_expense: report.total_expense,
            invalid_total: report.invalid_total,
            balance: report.closing_balance,
        })
    }

    /// Income lines: every payment that was ever verified, timestamped by
    /// its verification moment. Current status is deliberately ignored —
    /// invalidated payments keep their income line for the audit trail.
    fn income_lines(&self, class_id: i64, filter: &LedgerFilter) -> Result<Vec<RawEntry>> {
        let mut sql = String::from(
            "SELECT p.id, p.amount, p.verified_at, u.name, cm.role
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             WHERE fc.class_id = ? AND p.verified_at IS NOT NULL",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];
        push_filter(&mut sql, &mut params_vec, filter, "p.verified_at");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let occurred: String = row.get(2)?;
                Ok(RawEntry {
                    id,
                    kind: LedgerEntryKind::Payment,
                    occurred_at: parse_datetime(&occurred),
                    note: format!("Payment #{}", id),
                    subject_name: row.get(3)?,
                    subject_role: row.get(4)?,
                    amount: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reversal lines: currently-invalid payments, timestamped by the
    /// invalidation moment and attributed to whoever invalidated them
    fn reversal_lines(&self, class_id: i64, filter: &LedgerFilter) -> Result<Vec<RawEntry>> {
        let mut sql = String::from(
            "SELECT p.id, p.amount, p.invalidated_at, p.invalid_reason,
                    COALESCE(invu.name, u.name), cm.role
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             LEFT JOIN users invu ON invu.id = p.invalidated_by
             WHERE fc.class_id = ? AND p.status = 'invalid'",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];
        push_filter(&mut sql, &mut params_vec, filter, "p.invalidated_at");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let occurred: String = row.get(2)?;
                let reason: Option<String> = row.get(3)?;
                let note = match reason.filter(|r| !r.is_empty()) {
                    Some(r) => format!("Reversed payment #{} (invalid): {}", id, r),
                    None => format!("Reversed payment #{} (invalid)", id),
                };
                Ok(RawEntry {
                    id,
                    kind: LedgerEntryKind::InvalidPayment,
                    occurred_at: parse_datetime(&occurred),
                    note,
                    subject_name: row.get(4)?,
                    subject_role: row.get(5)?,
                    amount: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Expense lines, timestamped by spend date when recorded
    fn expense_lines(&self, class_id: i64, filter: &LedgerFilter) -> Result<Vec<RawEntry>> {
        let mut sql = String::from(
            "SELECT e.id, e.amount, COALESCE(e.spent_at, e.created_at), e.title,
                    COALESCE(u.name, ''), fc.name
             FROM expenses e
             LEFT JOIN fee_cycles fc ON fc.id = e.fee_cycle_id
             LEFT JOIN users u ON u.id = e.created_by
             WHERE e.class_id = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];
        push_filter(
            &mut sql,
            &mut params_vec,
            filter,
            "COALESCE(e.spent_at, e.created_at)",
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let occurred: String = row.get(2)?;
                let title: String = row.get(3)?;
                let cycle_name: Option<String> = row.get(5)?;
                let note = if title.is_empty() {
                    format!("Cycle expense {}", cycle_name.as_deref().unwrap_or("-"))
                } else {
                    title
                };
                Ok(RawEntry {
                    id: row.get(0)?,
                    kind: LedgerEntryKind::Expense,
                    // spent_at is a bare date; parse_datetime falls back per
                    // its contract, so normalize dates to midnight here
                    occurred_at: parse_occurred(&occurred),
                    note,
                    subject_name: row.get(4)?,
                    subject_role: "system".to_string(),
                    amount: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Collection progress for one cycle: expected vs verified income,
    /// expenses booked against the cycle, and the invoice amount breakdown
    pub fn cycle_report(&self, class_id: i64, cycle_id: i64) -> Result<CycleReport> {
        let cycle = self
            .get_fee_cycle(cycle_id)?
            .ok_or_else(|| Error::NotFound(format!("fee cycle {} not found", cycle_id)))?;

        let conn = self.conn()?;

        let active_members: i64 = conn.query_row(
            "SELECT COUNT(*) FROM class_members WHERE class_id = ? AND status = 'active'",
            params![class_id],
            |row| row.get(0),
        )?;

        let total_income: i64 = conn.query_row(
            "SELECT COALESCE(SUM(p.amount), 0)
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             WHERE i.fee_cycle_id = ? AND p.status = 'verified'",
            params![cycle_id],
            |row| row.get(0),
        )?;

        let total_expense: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses
             WHERE class_id = ? AND fee_cycle_id = ?",
            params![class_id, cycle_id],
            |row| row.get(0),
        )?;

        let mut by_status = [0i64; 4]; // unpaid, submitted, verified, paid
        let mut stmt = conn.prepare(
            "SELECT status, COALESCE(SUM(amount), 0) FROM invoices
             WHERE fee_cycle_id = ? GROUP BY status",
        )?;
        let rows = stmt.query_map(params![cycle_id], |row| {
            let status: String = row.get(0)?;
            let total: i64 = row.get(1)?;
            Ok((status, total))
        })?;
        for row in rows {
            let (status, total) = row?;
            match status.as_str() {
                "unpaid" => by_status[0] = total,
                "submitted" => by_status[1] = total,
                "verified" => by_status[2] = total,
                "paid" => by_status[3] = total,
                _ => {}
            }
        }

        Ok(CycleReport {
            class_id,
            fee_cycle_id: cycle_id,
            active_members,
            amount_per_member: cycle.amount_per_member,
            expected_total: active_members * cycle.amount_per_member,
            unpaid_total: by_status[0],
            submitted_total: by_status[1],
            verified_total: by_status[2],
            paid_total: by_status[3],
            total_income,
            total_expense,
            balance: total_income - total_expense,
        })
    }
}

/// Append the shared cycle/date narrowing to a stream query
fn push_filter(
    sql: &mut String,
    params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>,
    filter: &LedgerFilter,
    date_col: &str,
) {
    if let Some(cycle) = filter.fee_cycle_id {
        if sql.contains("FROM expenses") {
            sql.push_str(" AND e.fee_cycle_id = ?");
        } else {
            sql.push_str(" AND i.fee_cycle_id = ?");
        }
        params_vec.push(Box::new(cycle));
    }
    if let Some(from) = filter.from {
        sql.push_str(&format!(" AND date({}) >= ?", date_col));
        params_vec.push(Box::new(from.to_string()));
    }
    if let Some(to) = filter.to {
        sql.push_str(&format!(" AND date({}) <= ?", date_col));
        params_vec.push(Box::new(to.to_string()));
    }
}

/// Parse either a full datetime or a bare date (spent_at) into a timestamp
fn parse_occurred(s: &str) -> DateTime<Utc> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).unwrap_or_else(Utc::now);
    }
    parse_datetime(s)
}
