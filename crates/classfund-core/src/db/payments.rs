//! Payment submissions, verification verdicts, invalidation.
//!
//! Every decisive status write happens inside an IMMEDIATE transaction that
//! re-checks the current status, so concurrent pipeline runs and treasurer
//! actions serialize on the database and a lost race surfaces as a no-op or
//! a conflict instead of a silent overwrite. Invoice recomputation always
//! runs in the same transaction as the payment write.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

use super::{parse_datetime, parse_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;
use crate::ocr::OcrExtraction;

/// Everything the proof pipeline needs to know about one payment, loaded in
/// a single query
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub payment: Payment,
    pub invoice_amount: i64,
    pub invoice_status: InvoiceStatus,
    pub fee_cycle_id: i64,
    pub class_id: i64,
    /// Display name of the paying member's user, for note matching
    pub payer_name: String,
}

/// A payment as shown in treasurer lists, with payer/cycle context and the
/// OCR + auto-verification fields surfaced for review
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentListRow {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: i64,
    pub status: PaymentStatus,
    pub method: PayMethod,
    pub txn_ref: Option<String>,
    pub proof_path: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub auto_verified: bool,
    pub verify_reason_code: Option<String>,
    pub verify_reason_detail: Option<String>,
    pub ocr_amount: Option<i64>,
    pub ocr_txn_ref: Option<String>,
    pub ocr_method: Option<String>,
    pub payer_name: String,
    pub payer_email: String,
    pub invoice_amount: i64,
    pub invoice_status: InvoiceStatus,
    pub cycle_id: i64,
    pub cycle_name: String,
    pub verified_by_name: Option<String>,
    pub invalid_reason: Option<String>,
    pub invalidated_at: Option<chrono::DateTime<chrono::Utc>>,
}

const PAYMENT_COLS: &str = "id, invoice_id, payer_id, amount, method, txn_ref, proof_path, status,
    verified_by, verified_at,
    ocr_raw, ocr_amount, ocr_method, ocr_txn_ref, ocr_confidence,
    auto_verified, verify_reason_code, verify_reason_detail,
    invalidated_at, invalidated_by, invalid_reason, invalid_note,
    created_at";

impl Database {
    pub fn create_payment(&self, payment: &NewPayment) -> Result<Payment> {
        if payment.amount < 0 {
            return Err(Error::InvalidData("payment amount must not be negative".into()));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO payments (invoice_id, payer_id, amount, method, txn_ref, status)
             VALUES (?, ?, ?, ?, ?, 'submitted')",
            params![
                payment.invoice_id,
                payment.payer_id,
                payment.amount,
                payment.method.as_str(),
                payment.txn_ref,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_payment(id)?
            .ok_or_else(|| Error::NotFound("payment not found after creation".into()))
    }

    pub fn get_payment(&self, id: i64) -> Result<Option<Payment>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLS))?;
        let payment = stmt
            .query_row(params![id], |row| Self::row_to_payment(row))
            .optional()?;
        Ok(payment)
    }

    fn row_to_payment(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
        let method: String = row.get(4)?;
        let status: String = row.get(7)?;
        let verified_at: Option<String> = row.get(9)?;
        let invalidated_at: Option<String> = row.get(18)?;
        let created_at: String = row.get(22)?;
        Ok(Payment {
            id: row.get(0)?,
            invoice_id: row.get(1)?,
            payer_id: row.get(2)?,
            amount: row.get(3)?,
            method: method.parse().unwrap_or_default(),
            txn_ref: row.get(5)?,
            proof_path: row.get(6)?,
            status: status.parse().unwrap_or_default(),
            verified_by: row.get(8)?,
            verified_at: parse_opt_datetime(verified_at),
            ocr_raw: row.get(10)?,
            ocr_amount: row.get(11)?,
            ocr_method: row.get(12)?,
            ocr_txn_ref: row.get(13)?,
            ocr_confidence: row.get(14)?,
            auto_verified: row.get(15)?,
            verify_reason_code: row.get(16)?,
            verify_reason_detail: row.get(17)?,
            invalidated_at: parse_opt_datetime(invalidated_at),
            invalidated_by: row.get(19)?,
            invalid_reason: row.get(20)?,
            invalid_note: row.get(21)?,
            created_at: parse_datetime(&created_at),
        })
    }

    /// Load a payment with its invoice, cycle and payer context in one query
    pub fn payment_context(&self, payment_id: i64) -> Result<Option<PaymentContext>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, i.amount, i.status, i.fee_cycle_id, fc.class_id, u.name
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             WHERE p.id = ?",
            PAYMENT_COLS
                .split(',')
                .map(|c| format!("p.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;

        let ctx = stmt
            .query_row(params![payment_id], |row| {
                let payment = Self::row_to_payment(row)?;
                let invoice_status: String = row.get(24)?;
                Ok(PaymentContext {
                    payment,
                    invoice_amount: row.get(23)?,
                    invoice_status: invoice_status.parse().unwrap_or_default(),
                    fee_cycle_id: row.get(25)?,
                    class_id: row.get(26)?,
                    payer_name: row.get(27)?,
                })
            })
            .optional()?;
        Ok(ctx)
    }

    /// Whether a payment belongs to the given class (treasurer endpoints
    /// verify this before exposing anything)
    pub fn payment_in_class(&self, payment_id: i64, class_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             WHERE p.id = ? AND fc.class_id = ?",
            params![payment_id, class_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Attach (or replace) the proof image reference of a payment still
    /// awaiting review
    pub fn set_proof_path(&self, payment_id: i64, reference: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE payments SET proof_path = ? WHERE id = ? AND status = 'submitted'",
            params![reference, payment_id],
        )?;
        if updated == 0 {
            return Err(Error::Conflict(
                "payment is no longer awaiting review; submit a new payment instead".into(),
            ));
        }
        Ok(())
    }

    /// Persist the OCR layer. Written regardless of the eventual verdict so
    /// the extraction is auditable even for failed verifications.
    pub fn record_ocr_fields(&self, payment_id: i64, ocr: &OcrExtraction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE payments SET ocr_raw = ?, ocr_amount = ?, ocr_method = ?,
                 ocr_txn_ref = ?, ocr_confidence = ?
             WHERE id = ?",
            params![
                ocr.raw_text,
                ocr.amount,
                ocr.method,
                ocr.txn_ref,
                ocr.confidence,
                payment_id,
            ],
        )?;
        Ok(())
    }

    /// Record an auto-verification failure: the payment keeps its status and
    /// stays in the manual review queue, only the outcome layer changes.
    pub fn record_auto_failure(&self, payment_id: i64, code: &str, detail: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE payments SET auto_verified = 1, verify_reason_code = ?,
                 verify_reason_detail = ?, verified_by = NULL, verified_at = NULL
             WHERE id = ?",
            params![code, detail, payment_id],
        )?;
        Ok(())
    }

    /// Auto-approve a payment and promote its invoice, atomically.
    ///
    /// Returns false when the payment was no longer `submitted` — a
    /// concurrent run or a manual action got there first and this verdict is
    /// dropped on the floor by design.
    pub fn approve_auto(&self, payment_id: i64, code: &str, detail: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE payments SET status = 'verified', auto_verified = 1,
                 verify_reason_code = ?, verify_reason_detail = ?,
                 verified_by = NULL, verified_at = CURRENT_TIMESTAMP
             WHERE id = ? AND status = 'submitted'",
            params![code, detail, payment_id],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        let invoice_id: i64 = tx.query_row(
            "SELECT invoice_id FROM payments WHERE id = ?",
            params![payment_id],
            |row| row.get(0),
        )?;
        promote_invoice_if_fulfilled(&tx, invoice_id)?;

        tx.commit()?;
        Ok(true)
    }

    /// Manual treasurer verdict on a submitted payment
    pub fn verify_manual(
        &self,
        payment_id: i64,
        actor_user_id: i64,
        approve: bool,
    ) -> Result<Payment> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM payments WHERE id = ?",
                params![payment_id],
                |row| row.get(0),
            )
            .optional()?;
        let status: PaymentStatus = status
            .ok_or_else(|| Error::NotFound(format!("payment {} not found", payment_id)))?
            .parse()
            .unwrap_or_default();

        let next = if approve {
            PaymentStatus::Verified
        } else {
            PaymentStatus::Rejected
        };
        if !status.can_become(next) {
            return Err(Error::Conflict(format!(
                "payment is {}, not awaiting review",
                status
            )));
        }

        tx.execute(
            "UPDATE payments SET status = ?, verified_by = ?, verified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![next.as_str(), actor_user_id, payment_id],
        )?;

        if approve {
            let invoice_id: i64 = tx.query_row(
                "SELECT invoice_id FROM payments WHERE id = ?",
                params![payment_id],
                |row| row.get(0),
            )?;
            promote_invoice_if_fulfilled(&tx, invoice_id)?;
        }

        tx.commit()?;

        self.get_payment(payment_id)?
            .ok_or_else(|| Error::NotFound("payment not found after update".into()))
    }

    /// Invalidate a previously verified payment and recompute its invoice.
    ///
    /// The one deliberate backward move in the whole flow: the payment
    /// becomes terminally `invalid`, and the invoice regresses if the
    /// remaining verified sum no longer covers it. History is preserved —
    /// nothing is deleted, the ledger shows both the income and the
    /// reversal.
    pub fn invalidate_payment(
        &self,
        payment_id: i64,
        actor_user_id: i64,
        reason: &str,
        note: Option<&str>,
    ) -> Result<Payment> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, i64)> = tx
            .query_row(
                "SELECT status, invoice_id FROM payments WHERE id = ?",
                params![payment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (status, invoice_id) =
            row.ok_or_else(|| Error::NotFound(format!("payment {} not found", payment_id)))?;
        let status: PaymentStatus = status.parse().unwrap_or_default();

        if !status.can_become(PaymentStatus::Invalid) {
            return Err(Error::InvalidTransition {
                entity: "payment",
                from: status.to_string(),
                to: PaymentStatus::Invalid.to_string(),
            });
        }

        tx.execute(
            "UPDATE payments SET status = 'invalid', invalidated_at = CURRENT_TIMESTAMP,
                 invalidated_by = ?, invalid_reason = ?, invalid_note = ?
             WHERE id = ?",
            params![actor_user_id, reason, note, payment_id],
        )?;

        // Recompute from what is verified *now*; the invalidated payment no
        // longer counts.
        let (invoice_amount, invoice_status): (i64, String) = tx.query_row(
            "SELECT amount, status FROM invoices WHERE id = ?",
            params![invoice_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let invoice_status: InvoiceStatus = invoice_status.parse().unwrap_or_default();

        let fulfilled: i64 = tx.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments
             WHERE invoice_id = ? AND status = 'verified'",
            params![invoice_id],
            |row| row.get(0),
        )?;

        if fulfilled >= invoice_amount {
            // Still covered; a paid invoice stays paid, anything below
            // verified is promoted
            if matches!(invoice_status, InvoiceStatus::Unpaid | InvoiceStatus::Submitted) {
                tx.execute(
                    "UPDATE invoices SET status = 'verified' WHERE id = ?",
                    params![invoice_id],
                )?;
            }
        } else {
            let submitted_left: i64 = tx.query_row(
                "SELECT COUNT(*) FROM payments WHERE invoice_id = ? AND status = 'submitted'",
                params![invoice_id],
                |row| row.get(0),
            )?;
            let next = if submitted_left > 0 {
                InvoiceStatus::Submitted
            } else {
                InvoiceStatus::Unpaid
            };
            if invoice_status != next {
                tx.execute(
                    "UPDATE invoices SET status = ?, paid_at = NULL WHERE id = ?",
                    params![next.as_str(), invoice_id],
                )?;
            }
        }

        tx.commit()?;

        self.get_payment(payment_id)?
            .ok_or_else(|| Error::NotFound("payment not found after invalidation".into()))
    }

    // ========== Treasurer lists ==========

    /// Payments of a class filtered by status; `ai_failed` narrows to
    /// auto-processed payments that did not pass (reason code present while
    /// still awaiting review)
    pub fn list_payments(
        &self,
        class_id: i64,
        status: Option<PaymentStatus>,
        ai_failed: bool,
    ) -> Result<Vec<PaymentListRow>> {
        let mut sql = String::from(
            "SELECT p.id, p.invoice_id, p.amount, p.status, p.method, p.txn_ref, p.proof_path,
                    p.created_at, p.verified_at, p.auto_verified, p.verify_reason_code,
                    p.verify_reason_detail, p.ocr_amount, p.ocr_txn_ref, p.ocr_method,
                    u.name, u.email, i.amount, i.status, fc.id, fc.name, v.name,
                    p.invalid_reason, p.invalidated_at
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             LEFT JOIN users v ON v.id = p.verified_by
             WHERE fc.class_id = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];

        if let Some(status) = status {
            sql.push_str(" AND p.status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if ai_failed {
            sql.push_str(" AND p.auto_verified = 1 AND p.verify_reason_code IS NOT NULL AND p.status = 'submitted'");
        }
        sql.push_str(" ORDER BY p.created_at DESC, p.id DESC");

        self.query_payment_rows(&sql, &params_vec)
    }

    /// Verified payments of a class, optionally narrowed to a cycle, a
    /// paying member and a verified-at date window
    pub fn approved_payments(
        &self,
        class_id: i64,
        fee_cycle_id: Option<i64>,
        payer_member_id: Option<i64>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PaymentListRow>> {
        let mut sql = String::from(
            "SELECT p.id, p.invoice_id, p.amount, p.status, p.method, p.txn_ref, p.proof_path,
                    p.created_at, p.verified_at, p.auto_verified, p.verify_reason_code,
                    p.verify_reason_detail, p.ocr_amount, p.ocr_txn_ref, p.ocr_method,
                    u.name, u.email, i.amount, i.status, fc.id, fc.name, v.name,
                    p.invalid_reason, p.invalidated_at
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             LEFT JOIN users v ON v.id = p.verified_by
             WHERE fc.class_id = ? AND p.status = 'verified'",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];

        if let Some(cycle) = fee_cycle_id {
            sql.push_str(" AND i.fee_cycle_id = ?");
            params_vec.push(Box::new(cycle));
        }
        if let Some(member) = payer_member_id {
            sql.push_str(" AND p.payer_id = ?");
            params_vec.push(Box::new(member));
        }
        if let Some(from) = from {
            sql.push_str(" AND date(p.verified_at) >= ?");
            params_vec.push(Box::new(from.to_string()));
        }
        if let Some(to) = to {
            sql.push_str(" AND date(p.verified_at) <= ?");
            params_vec.push(Box::new(to.to_string()));
        }
        sql.push_str(" ORDER BY p.verified_at DESC, p.id DESC");

        self.query_payment_rows(&sql, &params_vec)
    }

    /// Invalidated payments of a class, newest reversal first
    pub fn invalid_payments(&self, class_id: i64) -> Result<Vec<PaymentListRow>> {
        let sql = "SELECT p.id, p.invoice_id, p.amount, p.status, p.method, p.txn_ref, p.proof_path,
                    p.created_at, p.verified_at, p.auto_verified, p.verify_reason_code,
                    p.verify_reason_detail, p.ocr_amount, p.ocr_txn_ref, p.ocr_method,
                    u.name, u.email, i.amount, i.status, fc.id, fc.name, v.name,
                    p.invalid_reason, p.invalidated_at
             FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN fee_cycles fc ON fc.id = i.fee_cycle_id
             JOIN class_members cm ON cm.id = p.payer_id
             JOIN users u ON u.id = cm.user_id
             LEFT JOIN users v ON v.id = p.verified_by
             WHERE fc.class_id = ? AND p.status = 'invalid'
             ORDER BY p.invalidated_at DESC, p.id DESC";
        let params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(class_id)];
        self.query_payment_rows(sql, &params_vec)
    }

    fn query_payment_rows(
        &self,
        sql: &str,
        params_vec: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<PaymentListRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let status: String = row.get(3)?;
                let method: String = row.get(4)?;
                let created_at: String = row.get(7)?;
                let verified_at: Option<String> = row.get(8)?;
                let invoice_status: String = row.get(18)?;
                let invalidated_at: Option<String> = row.get(23)?;
                Ok(PaymentListRow {
                    id: row.get(0)?,
                    invoice_id: row.get(1)?,
                    amount: row.get(2)?,
                    status: status.parse().unwrap_or_default(),
                    method: method.parse().unwrap_or_default(),
                    txn_ref: row.get(5)?,
                    proof_path: row.get(6)?,
                    created_at: parse_datetime(&created_at),
                    verified_at: parse_opt_datetime(verified_at),
                    auto_verified: row.get(9)?,
                    verify_reason_code: row.get(10)?,
                    verify_reason_detail: row.get(11)?,
                    ocr_amount: row.get(12)?,
                    ocr_txn_ref: row.get(13)?,
                    ocr_method: row.get(14)?,
                    payer_name: row.get(15)?,
                    payer_email: row.get(16)?,
                    invoice_amount: row.get(17)?,
                    invoice_status: invoice_status.parse().unwrap_or_default(),
                    cycle_id: row.get(19)?,
                    cycle_name: row.get(20)?,
                    verified_by_name: row.get(21)?,
                    invalid_reason: row.get(22)?,
                    invalidated_at: parse_opt_datetime(invalidated_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bump an untouched invoice to `submitted` when its first payment
    /// arrives; any other state is left alone
    pub fn bump_invoice_submitted(&self, invoice_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE invoices SET status = 'submitted' WHERE id = ? AND status = 'unpaid'",
            params![invoice_id],
        )?;
        Ok(())
    }
}

/// Promote an invoice to `verified` when its verified payments now cover the
/// amount. Runs inside the caller's transaction; paid and already-verified
/// invoices are left untouched.
fn promote_invoice_if_fulfilled(tx: &Transaction, invoice_id: i64) -> Result<()> {
    let (amount, status): (i64, String) = tx.query_row(
        "SELECT amount, status FROM invoices WHERE id = ?",
        params![invoice_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let status: InvoiceStatus = status.parse().unwrap_or_default();

    let fulfilled: i64 = tx.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE invoice_id = ? AND status = 'verified'",
        params![invoice_id],
        |row| row.get(0),
    )?;

    if fulfilled >= amount && status.can_become(InvoiceStatus::Verified) {
        tx.execute(
            "UPDATE invoices SET status = 'verified' WHERE id = ?",
            params![invoice_id],
        )?;
    }
    Ok(())
}
