//! Expense records

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_opt_date, Database};
use crate::error::{Error, Result};
use crate::models::*;

/// An expense as listed, with creator and cycle names joined in
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExpenseRow {
    pub id: i64,
    pub class_id: i64,
    pub fee_cycle_id: Option<i64>,
    pub title: String,
    pub amount: i64,
    pub note: Option<String>,
    pub spent_at: Option<chrono::NaiveDate>,
    pub receipt_path: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub created_by_name: String,
    pub cycle_name: Option<String>,
}

impl Database {
    pub fn create_expense(&self, expense: &NewExpense) -> Result<Expense> {
        if expense.amount < 0 {
            return Err(Error::InvalidData("expense amount must not be negative".into()));
        }
        if let Some(cycle_id) = expense.fee_cycle_id {
            self.assert_cycle_in_class(cycle_id, expense.class_id)?;
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO expenses (class_id, fee_cycle_id, title, amount, note, spent_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                expense.class_id,
                expense.fee_cycle_id,
                expense.title,
                expense.amount,
                expense.note,
                expense.spent_at.map(|d| d.to_string()),
                expense.created_by,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_expense(id)?
            .ok_or_else(|| Error::NotFound("expense not found after creation".into()))
    }

    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, fee_cycle_id, title, amount, note, spent_at, receipt_path,
                    created_by, created_at, updated_at
             FROM expenses WHERE id = ?",
        )?;
        let expense = stmt
            .query_row(params![id], |row| {
                let spent_at: Option<String> = row.get(6)?;
                let created_at: String = row.get(9)?;
                let updated_at: String = row.get(10)?;
                Ok(Expense {
                    id: row.get(0)?,
                    class_id: row.get(1)?,
                    fee_cycle_id: row.get(2)?,
                    title: row.get(3)?,
                    amount: row.get(4)?,
                    note: row.get(5)?,
                    spent_at: parse_opt_date(spent_at),
                    receipt_path: row.get(7)?,
                    created_by: row.get(8)?,
                    created_at: parse_datetime(&created_at),
                    updated_at: parse_datetime(&updated_at),
                })
            })
            .optional()?;
        Ok(expense)
    }

    pub fn list_expenses(
        &self,
        class_id: i64,
        fee_cycle_id: Option<i64>,
    ) -> Result<Vec<ExpenseRow>> {
        let conn = self.conn()?;
        let mut sql = String::from(
            "SELECT e.id, e.class_id, e.fee_cycle_id, e.title, e.amount, e.note, e.spent_at,
                    e.receipt_path, e.created_at, u.name, fc.name
             FROM expenses e
             JOIN users u ON u.id = e.created_by
             LEFT JOIN fee_cycles fc ON fc.id = e.fee_cycle_id
             WHERE e.class_id = ?",
        );
        if fee_cycle_id.is_some() {
            sql.push_str(" AND e.fee_cycle_id = ?");
        }
        sql.push_str(" ORDER BY e.created_at DESC, e.id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row| {
            let spent_at: Option<String> = row.get(6)?;
            let created_at: String = row.get(8)?;
            Ok(ExpenseRow {
                id: row.get(0)?,
                class_id: row.get(1)?,
                fee_cycle_id: row.get(2)?,
                title: row.get(3)?,
                amount: row.get(4)?,
                note: row.get(5)?,
                spent_at: parse_opt_date(spent_at),
                receipt_path: row.get(7)?,
                created_at: parse_datetime(&created_at),
                created_by_name: row.get(9)?,
                cycle_name: row.get(10)?,
            })
        };

        let rows = match fee_cycle_id {
            Some(cycle) => stmt
                .query_map(params![class_id, cycle], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![class_id], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    pub fn update_expense(
        &self,
        expense_id: i64,
        title: &str,
        amount: i64,
        fee_cycle_id: Option<i64>,
        note: Option<&str>,
        spent_at: Option<chrono::NaiveDate>,
    ) -> Result<Expense> {
        if amount < 0 {
            return Err(Error::InvalidData("expense amount must not be negative".into()));
        }
        let existing = self
            .get_expense(expense_id)?
            .ok_or_else(|| Error::NotFound(format!("expense {} not found", expense_id)))?;
        if let Some(cycle_id) = fee_cycle_id {
            self.assert_cycle_in_class(cycle_id, existing.class_id)?;
        }

        let conn = self.conn()?;
        conn.execute(
            "UPDATE expenses SET title = ?, amount = ?, fee_cycle_id = ?, note = ?,
                 spent_at = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                title,
                amount,
                fee_cycle_id,
                note,
                spent_at.map(|d| d.to_string()),
                expense_id,
            ],
        )?;
        drop(conn);

        self.get_expense(expense_id)?
            .ok_or_else(|| Error::NotFound("expense not found after update".into()))
    }

    /// Delete an expense; returns its receipt reference so the caller can
    /// clean up the stored image
    pub fn delete_expense(&self, expense_id: i64) -> Result<Option<String>> {
        let expense = self
            .get_expense(expense_id)?
            .ok_or_else(|| Error::NotFound(format!("expense {} not found", expense_id)))?;

        let conn = self.conn()?;
        conn.execute("DELETE FROM expenses WHERE id = ?", params![expense_id])?;
        Ok(expense.receipt_path)
    }

    pub fn set_expense_receipt(&self, expense_id: i64, reference: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE expenses SET receipt_path = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![reference, expense_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("expense {} not found", expense_id)));
        }
        Ok(())
    }

    /// A cycle referenced by an expense must belong to the same class
    fn assert_cycle_in_class(&self, cycle_id: i64, class_id: i64) -> Result<()> {
        let cycle = self
            .get_fee_cycle(cycle_id)?
            .ok_or_else(|| Error::NotFound(format!("fee cycle {} not found", cycle_id)))?;
        if cycle.class_id != class_id {
            return Err(Error::InvalidData(
                "fee cycle does not belong to this class".into(),
            ));
        }
        Ok(())
    }
}
