//! Fee cycles and invoice generation

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_opt_date, Database};
use crate::error::{Error, Result};
use crate::models::*;

/// Outcome of generating invoices for a cycle
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerateInvoicesResult {
    pub cycle_id: i64,
    pub amount_per_member: i64,
    pub created: usize,
    pub skipped: usize,
    pub total_members: usize,
}

impl Database {
    pub fn create_fee_cycle(&self, cycle: &NewFeeCycle) -> Result<FeeCycle> {
        if cycle.amount_per_member < 0 {
            return Err(Error::InvalidData(
                "amount_per_member must not be negative".into(),
            ));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO fee_cycles (class_id, name, term, amount_per_member, due_date, status, allow_late)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                cycle.class_id,
                cycle.name,
                cycle.term,
                cycle.amount_per_member,
                cycle.due_date.map(|d| d.to_string()),
                cycle.status.as_str(),
                cycle.allow_late,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_fee_cycle(id)?
            .ok_or_else(|| Error::NotFound("fee cycle not found after creation".into()))
    }

    pub fn get_fee_cycle(&self, id: i64) -> Result<Option<FeeCycle>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, name, term, amount_per_member, due_date, status, allow_late, created_at
             FROM fee_cycles WHERE id = ?",
        )?;
        let cycle = stmt
            .query_row(params![id], |row| Self::row_to_cycle(row))
            .optional()?;
        Ok(cycle)
    }

    pub fn list_fee_cycles(&self, class_id: i64) -> Result<Vec<FeeCycle>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, name, term, amount_per_member, due_date, status, allow_late, created_at
             FROM fee_cycles WHERE class_id = ? ORDER BY created_at DESC, id DESC",
        )?;
        let cycles = stmt
            .query_map(params![class_id], |row| Self::row_to_cycle(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cycles)
    }

    fn row_to_cycle(row: &rusqlite::Row) -> rusqlite::Result<FeeCycle> {
        let due_date: Option<String> = row.get(5)?;
        let status: String = row.get(6)?;
        let created_at: String = row.get(8)?;
        Ok(FeeCycle {
            id: row.get(0)?,
            class_id: row.get(1)?,
            name: row.get(2)?,
            term: row.get(3)?,
            amount_per_member: row.get(4)?,
            due_date: parse_opt_date(due_date),
            status: status.parse().unwrap_or_default(),
            allow_late: row.get(7)?,
            created_at: parse_datetime(&created_at),
        })
    }

    /// Update cycle status (free-form within the enum) and optionally the
    /// late-submission flag
    pub fn update_cycle_status(
        &self,
        cycle_id: i64,
        status: CycleStatus,
        allow_late: Option<bool>,
    ) -> Result<FeeCycle> {
        let conn = self.conn()?;
        match allow_late {
            Some(allow) => conn.execute(
                "UPDATE fee_cycles SET status = ?, allow_late = ? WHERE id = ?",
                params![status.as_str(), allow, cycle_id],
            )?,
            None => conn.execute(
                "UPDATE fee_cycles SET status = ? WHERE id = ?",
                params![status.as_str(), cycle_id],
            )?,
        };
        drop(conn);

        self.get_fee_cycle(cycle_id)?
            .ok_or_else(|| Error::NotFound(format!("fee cycle {} not found", cycle_id)))
    }

    /// Create one invoice per active class member. Members who already have
    /// an invoice for this cycle are skipped, so the operation is safe to
    /// repeat after new members join.
    pub fn generate_invoices(
        &self,
        cycle_id: i64,
        amount_override: Option<i64>,
    ) -> Result<GenerateInvoicesResult> {
        let cycle = self
            .get_fee_cycle(cycle_id)?
            .ok_or_else(|| Error::NotFound(format!("fee cycle {} not found", cycle_id)))?;
        let amount = amount_override.unwrap_or(cycle.amount_per_member);
        if amount < 0 {
            return Err(Error::InvalidData("invoice amount must not be negative".into()));
        }

        let member_ids = self.active_member_ids(cycle.class_id)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut created = 0usize;
        let mut skipped = 0usize;

        for member_id in &member_ids {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO invoices (fee_cycle_id, member_id, amount, status)
                 VALUES (?, ?, ?, 'unpaid')",
                params![cycle_id, member_id, amount],
            )?;
            if inserted > 0 {
                created += 1;
            } else {
                skipped += 1;
            }
        }
        tx.commit()?;

        Ok(GenerateInvoicesResult {
            cycle_id,
            amount_per_member: amount,
            created,
            skipped,
            total_members: member_ids.len(),
        })
    }
}
