//! Invoice reads and status maintenance.
//!
//! The decisive status *writes* (promotion on verification, regression on
//! invalidation) live in `payments.rs` inside the same transactions that
//! change payment state; this module covers reads and the treasurer-facing
//! mark-paid edge.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;

/// An invoice as listed for its owning member, with cycle context
#[derive(Debug, Clone, serde::Serialize)]
pub struct MyInvoiceRow {
    pub id: i64,
    pub fee_cycle_id: i64,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cycle_name: String,
    pub cycle_term: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub cycle_status: CycleStatus,
    pub allow_late: bool,
}

/// Invoice detail with payment sums and viewer capabilities
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvoiceDetail {
    pub id: i64,
    pub fee_cycle_id: i64,
    pub member_id: i64,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub sum_verified: i64,
    pub sum_submitted: i64,
    /// Whether the viewing member may submit a payment right now
    pub can_submit: bool,
    pub can_mark_paid: bool,
    pub cycle: FeeCycle,
}

/// One unsettled invoice in the per-cycle chase list
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnpaidMemberRow {
    pub invoice_id: i64,
    pub member_id: i64,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
    pub last_submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Database {
    pub fn get_invoice(&self, id: i64) -> Result<Option<Invoice>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fee_cycle_id, member_id, amount, status, paid_at, created_at
             FROM invoices WHERE id = ?",
        )?;
        let invoice = stmt
            .query_row(params![id], |row| Self::row_to_invoice(row))
            .optional()?;
        Ok(invoice)
    }

    pub(crate) fn row_to_invoice(row: &rusqlite::Row) -> rusqlite::Result<Invoice> {
        let status: String = row.get(4)?;
        let paid_at: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(Invoice {
            id: row.get(0)?,
            fee_cycle_id: row.get(1)?,
            member_id: row.get(2)?,
            amount: row.get(3)?,
            status: status.parse().unwrap_or_default(),
            paid_at: parse_opt_datetime(paid_at),
            created_at: parse_datetime(&created_at),
        })
    }

    /// Invoices belonging to one member, newest cycle first
    pub fn my_invoices(&self, member_id: i64) -> Result<Vec<MyInvoiceRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.fee_cycle_id, i.amount, i.status, i.paid_at,
                    fc.name, fc.term, fc.due_date, fc.status, fc.allow_late
             FROM invoices i
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             WHERE i.member_id = ?
             ORDER BY i.created_at DESC, i.id DESC",
        )?;
        let rows = stmt
            .query_map(params![member_id], |row| {
                let status: String = row.get(3)?;
                let paid_at: Option<String> = row.get(4)?;
                let due_date: Option<String> = row.get(7)?;
                let cycle_status: String = row.get(8)?;
                Ok(MyInvoiceRow {
                    id: row.get(0)?,
                    fee_cycle_id: row.get(1)?,
                    amount: row.get(2)?,
                    status: status.parse().unwrap_or_default(),
                    paid_at: parse_opt_datetime(paid_at),
                    cycle_name: row.get(5)?,
                    cycle_term: row.get(6)?,
                    due_date: super::parse_opt_date(due_date),
                    cycle_status: cycle_status.parse().unwrap_or_default(),
                    allow_late: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Invoice detail with verified/submitted sums and the viewer's
    /// capabilities. `viewer_owns_invoice` and `viewer_is_treasurer_like`
    /// come from the access layer; `today` makes the due-date check
    /// deterministic in tests.
    pub fn invoice_detail(
        &self,
        invoice_id: i64,
        viewer_owns_invoice: bool,
        viewer_is_treasurer_like: bool,
        today: NaiveDate,
    ) -> Result<InvoiceDetail> {
        let invoice = self
            .get_invoice(invoice_id)?
            .ok_or_else(|| Error::NotFound(format!("invoice {} not found", invoice_id)))?;
        let cycle = self
            .get_fee_cycle(invoice.fee_cycle_id)?
            .ok_or_else(|| Error::NotFound("fee cycle not found".into()))?;

        let conn = self.conn()?;
        let sum_verified: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = ? AND status = 'verified'",
            params![invoice_id],
            |row| row.get(0),
        )?;
        let sum_submitted: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = ? AND status = 'submitted'",
            params![invoice_id],
            |row| row.get(0),
        )?;

        // Only the invoice owner may submit, only while the invoice is open,
        // and not past the due date unless the cycle allows late submission
        let mut can_submit = viewer_owns_invoice
            && matches!(invoice.status, InvoiceStatus::Unpaid | InvoiceStatus::Submitted);
        if can_submit && !cycle.allow_late {
            if let Some(due) = cycle.due_date {
                if today > due {
                    can_submit = false;
                }
            }
        }

        Ok(InvoiceDetail {
            id: invoice.id,
            fee_cycle_id: invoice.fee_cycle_id,
            member_id: invoice.member_id,
            amount: invoice.amount,
            status: invoice.status,
            paid_at: invoice.paid_at,
            sum_verified,
            sum_submitted,
            can_submit,
            can_mark_paid: viewer_is_treasurer_like,
            cycle,
        })
    }

    /// Treasurer settles an invoice for good. Enforced against the invoice
    /// transition table: only submitted/verified invoices can become paid.
    pub fn mark_invoice_paid(&self, invoice_id: i64) -> Result<Invoice> {
        let invoice = self
            .get_invoice(invoice_id)?
            .ok_or_else(|| Error::NotFound(format!("invoice {} not found", invoice_id)))?;

        if !invoice.status.can_become(InvoiceStatus::Paid) {
            return Err(Error::InvalidTransition {
                entity: "invoice",
                from: invoice.status.to_string(),
                to: InvoiceStatus::Paid.to_string(),
            });
        }

        let conn = self.conn()?;
        conn.execute(
            "UPDATE invoices SET status = 'paid', paid_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![invoice_id],
        )?;
        drop(conn);

        self.get_invoice(invoice_id)?
            .ok_or_else(|| Error::NotFound("invoice not found after update".into()))
    }

    /// Unsettled invoices of a cycle with member contact details, submitted
    /// ones first so treasurers see actionable rows on top
    pub fn unpaid_members(&self, cycle_id: i64) -> Result<Vec<UnpaidMemberRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.member_id, i.amount, i.status,
                    u.name, u.email, u.phone,
                    (SELECT MAX(p.created_at) FROM payments p
                     WHERE p.invoice_id = i.id AND p.status IN ('submitted', 'verified'))
             FROM invoices i
             JOIN class_members cm ON cm.id = i.member_id
             JOIN users u ON u.id = cm.user_id
             WHERE i.fee_cycle_id = ? AND i.status IN ('unpaid', 'submitted')
             ORDER BY CASE i.status WHEN 'submitted' THEN 0 ELSE 1 END, i.id DESC",
        )?;
        let rows = stmt
            .query_map(params![cycle_id], |row| {
                let status: String = row.get(3)?;
                let last: Option<String> = row.get(7)?;
                Ok(UnpaidMemberRow {
                    invoice_id: row.get(0)?,
                    member_id: row.get(1)?,
                    amount: row.get(2)?,
                    status: status.parse().unwrap_or_default(),
                    user_name: row.get(4)?,
                    user_email: row.get(5)?,
                    user_phone: row.get(6)?,
                    last_submitted_at: parse_opt_datetime(last),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
