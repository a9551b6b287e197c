//! Asynchronous payment-proof processing.
//!
//! Runs whenever a member submits a payment with a proof image or uploads a
//! new one. The submitting request returns as soon as the job is enqueued;
//! this pipeline later resolves the image, calls the OCR collaborator, runs
//! the decision engine and writes the verdict back.
//!
//! Failure discipline: every expected fault (missing image, engine error,
//! empty extraction, rule mismatch) is recorded on the payment row as a
//! reason code and the job returns cleanly — the payment stays in the manual
//! review queue and treasurers are notified. Only genuinely unexpected
//! faults (database I/O) propagate to the spawn wrapper, which logs them for
//! the job infrastructure.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::VerifyConfig;
use crate::db::{Database, PaymentContext};
use crate::error::Result;
use crate::models::PaymentStatus;
use crate::ocr::{OcrBackend, OcrClient};
use crate::storage::ImageStore;
use crate::verify::{decide, ReasonCode};

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The payment no longer exists (deleted concurrently); nothing written
    PaymentGone,
    /// The payment already left the `submitted` state; reprocessing skipped
    AlreadyProcessed,
    /// Auto-verification passed and the payment is now verified
    Approved,
    /// A failure outcome was recorded; the payment awaits manual review
    Failed(ReasonCode),
    /// Another writer settled the payment between our decision and write
    LostRace,
}

/// Enqueue a pipeline run on the current tokio runtime.
///
/// The spawned task logs any unexpected error with full context; expected
/// faults never reach it.
pub fn enqueue(
    db: Database,
    ocr: OcrClient,
    store: ImageStore,
    cfg: VerifyConfig,
    payment_id: i64,
    image_path: Option<PathBuf>,
) {
    tokio::spawn(async move {
        if let Err(e) = process_payment_proof(&db, &ocr, &store, &cfg, payment_id, image_path).await
        {
            error!(payment_id, error = %e, "proof pipeline crashed");
        }
    });
}

/// Process one payment's proof image end to end.
///
/// Reentrant: safe to invoke repeatedly for the same payment id. The status
/// guard skips settled payments, and the decisive write re-checks the status
/// inside its own transaction, so racing runs degrade to no-ops.
pub async fn process_payment_proof(
    db: &Database,
    ocr: &OcrClient,
    store: &ImageStore,
    cfg: &VerifyConfig,
    payment_id: i64,
    image_path: Option<PathBuf>,
) -> Result<PipelineOutcome> {
    info!(payment_id, "proof pipeline start");

    // 1. Load the payment with its invoice/cycle/payer context
    let Some(ctx) = db.payment_context(payment_id)? else {
        warn!(payment_id, "payment not found, skipping");
        return Ok(PipelineOutcome::PaymentGone);
    };

    // 2. Idempotence guard: only submitted payments are processable
    if ctx.payment.status != PaymentStatus::Submitted {
        info!(payment_id, status = %ctx.payment.status, "payment already settled, skipping");
        return Ok(PipelineOutcome::AlreadyProcessed);
    }

    // 3. Fund account is optional; the decision engine tolerates its absence
    let fund = db.fund_account_for_class(ctx.class_id)?;

    // 4. Resolve the proof image to a readable path
    let Some(abs_path) = resolve_image(store, &ctx, image_path) else {
        return fail(
            db,
            &ctx,
            ReasonCode::ProofNotFound,
            "cannot resolve proof image path",
        );
    };
    info!(payment_id, path = %abs_path.display(), "resolved proof image");

    // 5. OCR. The collaborator is never trusted: any error is a soft
    // failure, not a pipeline crash.
    let extraction = match ocr.extract(&abs_path).await {
        Ok(extraction) => extraction,
        Err(e) => {
            error!(payment_id, error = %e, "OCR extraction failed");
            return fail(db, &ctx, ReasonCode::OcrError, &e.to_string());
        }
    };

    // 6. Persist the extraction before judging it, so failed verifications
    // are still auditable
    db.record_ocr_fields(payment_id, &extraction)?;

    if !extraction.ok {
        return fail(db, &ctx, ReasonCode::OcrEmpty, "no text/amount extracted");
    }

    // 7. The decision engine is pure; all context goes in as arguments
    let decision = decide(
        ctx.payment.amount,
        &ctx.payer_name,
        ctx.payment.invoice_id,
        &extraction,
        fund.as_ref(),
        cfg,
    );
    info!(payment_id, pass = decision.pass, code = %decision.code, "decision");

    if decision.pass {
        // 8. Verified + invoice promotion in one transaction, guarded by a
        // status re-check inside it
        if db.approve_auto(payment_id, decision.code.as_str(), &decision.detail)? {
            notify_outcome(db, &ctx, true, decision.code);
            Ok(PipelineOutcome::Approved)
        } else {
            info!(payment_id, "verdict dropped: payment settled concurrently");
            Ok(PipelineOutcome::LostRace)
        }
    } else {
        // 9. Rule mismatch is a normal outcome, not an error: record it and
        // leave the payment for manual review
        fail(db, &ctx, decision.code, &decision.detail)
    }
}

/// Record a failure outcome and notify treasurers
fn fail(
    db: &Database,
    ctx: &PaymentContext,
    code: ReasonCode,
    detail: &str,
) -> Result<PipelineOutcome> {
    db.record_auto_failure(ctx.payment.id, code.as_str(), detail)?;
    notify_outcome(db, ctx, false, code);
    Ok(PipelineOutcome::Failed(code))
}

/// Prefer the pre-resolved path handed over by the upload handler; fall back
/// to resolving the stored reference
fn resolve_image(
    store: &ImageStore,
    ctx: &PaymentContext,
    image_path: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = image_path {
        if path.is_file() {
            return Some(path);
        }
    }
    let reference = ctx.payment.proof_path.as_deref()?;
    store.resolve(reference).ok()
}

/// Tell every owner/treasurer how the run ended. Notification failures are
/// logged and swallowed — they must never fail the pipeline.
fn notify_outcome(db: &Database, ctx: &PaymentContext, ok: bool, code: ReasonCode) {
    let (kind, title) = if ok {
        ("payment_verified", "Auto-verification passed")
    } else {
        ("payment_rejected", "Auto-verification failed")
    };
    let status = if ok {
        PaymentStatus::Verified
    } else {
        ctx.payment.status
    };
    let body = format!(
        "Payment #{} — status={}, code={}",
        ctx.payment.id, status, code
    );

    if let Err(e) = db.notify_treasurers(ctx.class_id, kind, title, &body) {
        warn!(payment_id = ctx.payment.id, error = %e, "treasurer notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::ocr::{MockOcrBackend, OcrExtraction};

    /// A class with an owner, a payer, an active cycle and one submitted
    /// payment carrying a stored proof image
    struct Fixture {
        db: Database,
        store: ImageStore,
        _dir: tempfile::TempDir,
        payment_id: i64,
        invoice_id: i64,
        class_id: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let owner = db.create_user("Co Chu Nhiem", "owner@example.com", None).unwrap();
        let payer = db.create_user("Nguyen Van A", "a@example.com", None).unwrap();
        let class = db.create_class("10A1", owner).unwrap();
        let member = db.join_class(class.id, payer).unwrap();

        let cycle = db
            .create_fee_cycle(&NewFeeCycle {
                class_id: class.id,
                name: "Thang 9".into(),
                term: None,
                amount_per_member: 200_000,
                due_date: None,
                status: CycleStatus::Active,
                allow_late: true,
            })
            .unwrap();
        db.generate_invoices(cycle.id, None).unwrap();

        let invoice = db.my_invoices(member.id).unwrap().remove(0);
        let payment = db
            .create_payment(&NewPayment {
                invoice_id: invoice.id,
                payer_id: member.id,
                amount: 200_000,
                method: PayMethod::Bank,
                txn_ref: None,
            })
            .unwrap();
        db.bump_invoice_submitted(invoice.id).unwrap();

        let reference = store.store(b"proof-image", "proofs").unwrap();
        db.set_proof_path(payment.id, &reference).unwrap();

        Fixture {
            db,
            store,
            _dir: dir,
            payment_id: payment.id,
            invoice_id: invoice.id,
            class_id: class.id,
        }
    }

    fn cfg() -> VerifyConfig {
        VerifyConfig {
            amount_tolerance_abs: 1000,
            amount_tolerance_pct: 0.0,
            require_payee_match: false,
            payee_tail_len: 6,
            require_txn_ref: false,
            require_note: true,
            note_must_include: vec![],
        }
    }

    fn good_extraction(invoice_id: i64) -> OcrExtraction {
        let note = format!("Chuyen khoan lop {} thang 9", invoice_id);
        OcrExtraction {
            ok: true,
            raw_text: note.clone(),
            amount: Some(200_000),
            method: Some("bank".into()),
            txn_ref: Some("CK123456".into()),
            payee_account: None,
            note: Some(note),
            confidence: Some(90),
        }
    }

    #[tokio::test]
    async fn test_pass_verifies_payment_and_promotes_invoice() {
        let f = fixture();
        let ocr = OcrClient::mock(MockOcrBackend::returning(good_extraction(f.invoice_id)));

        let outcome =
            process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
                .await
                .unwrap();
        assert_eq!(outcome, PipelineOutcome::Approved);

        let payment = f.db.get_payment(f.payment_id).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Verified);
        assert!(payment.auto_verified);
        assert_eq!(payment.verify_reason_code.as_deref(), Some("MATCH_OK"));
        assert_eq!(payment.verified_by, None); // automatic, not manual
        assert!(payment.verified_at.is_some());
        assert_eq!(payment.ocr_amount, Some(200_000));

        let invoice = f.db.get_invoice(f.invoice_id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Verified);
    }

    #[tokio::test]
    async fn test_rule_mismatch_keeps_payment_submitted() {
        let f = fixture();
        let mut extraction = good_extraction(f.invoice_id);
        extraction.amount = Some(120_000); // way off
        let ocr = OcrClient::mock(MockOcrBackend::returning(extraction));

        let outcome =
            process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
                .await
                .unwrap();
        assert_eq!(outcome, PipelineOutcome::Failed(ReasonCode::AmountMismatch));

        let payment = f.db.get_payment(f.payment_id).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Submitted);
        assert!(payment.auto_verified);
        assert_eq!(
            payment.verify_reason_code.as_deref(),
            Some("AMOUNT_MISMATCH")
        );
        assert_eq!(payment.verified_at, None);

        // OCR layer is persisted even for failures
        assert_eq!(payment.ocr_amount, Some(120_000));

        let invoice = f.db.get_invoice(f.invoice_id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_ocr_error_is_soft_failure() {
        let f = fixture();
        let ocr = OcrClient::mock(MockOcrBackend::failing("engine exploded"));

        let outcome =
            process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
                .await
                .unwrap();
        assert_eq!(outcome, PipelineOutcome::Failed(ReasonCode::OcrError));

        let payment = f.db.get_payment(f.payment_id).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Submitted);
        assert_eq!(payment.verify_reason_code.as_deref(), Some("OCR_ERROR"));
        assert!(payment
            .verify_reason_detail
            .as_deref()
            .unwrap()
            .contains("engine exploded"));
    }

    #[tokio::test]
    async fn test_empty_extraction_records_ocr_empty() {
        let f = fixture();
        let ocr = OcrClient::mock(MockOcrBackend::returning(OcrExtraction {
            ok: false,
            raw_text: "".into(),
            ..Default::default()
        }));

        let outcome =
            process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
                .await
                .unwrap();
        assert_eq!(outcome, PipelineOutcome::Failed(ReasonCode::OcrEmpty));
    }

    #[tokio::test]
    async fn test_missing_proof_records_proof_not_found() {
        let f = fixture();
        // wipe the stored image out from under the payment
        let payment = f.db.get_payment(f.payment_id).unwrap().unwrap();
        f.store.delete(payment.proof_path.as_deref().unwrap());

        let mock = MockOcrBackend::returning(good_extraction(f.invoice_id));
        let ocr = OcrClient::mock(mock.clone());

        let outcome =
            process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
                .await
                .unwrap();
        assert_eq!(outcome, PipelineOutcome::Failed(ReasonCode::ProofNotFound));
        assert_eq!(mock.call_count(), 0); // engine never invoked
    }

    #[tokio::test]
    async fn test_second_run_on_verified_payment_is_a_noop() {
        let f = fixture();
        let mock = MockOcrBackend::returning(good_extraction(f.invoice_id));
        let ocr = OcrClient::mock(mock.clone());
        let cfg = cfg();

        let first = process_payment_proof(&f.db, &ocr, &f.store, &cfg, f.payment_id, None)
            .await
            .unwrap();
        assert_eq!(first, PipelineOutcome::Approved);
        let notifications_after_first = f.db.list_notifications(1, false).unwrap().len();

        let second = process_payment_proof(&f.db, &ocr, &f.store, &cfg, f.payment_id, None)
            .await
            .unwrap();
        assert_eq!(second, PipelineOutcome::AlreadyProcessed);

        // no second OCR call, no duplicate notification
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            f.db.list_notifications(1, false).unwrap().len(),
            notifications_after_first
        );
    }

    #[tokio::test]
    async fn test_unknown_payment_id_is_harmless() {
        let f = fixture();
        let ocr = OcrClient::mock(MockOcrBackend::new());
        let outcome = process_payment_proof(&f.db, &ocr, &f.store, &cfg(), 99_999, None)
            .await
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::PaymentGone);
    }

    #[tokio::test]
    async fn test_treasurers_are_notified_of_outcome() {
        let f = fixture();
        let ocr = OcrClient::mock(MockOcrBackend::returning(good_extraction(f.invoice_id)));

        process_payment_proof(&f.db, &ocr, &f.store, &cfg(), f.payment_id, None)
            .await
            .unwrap();

        // owner (user 1) is the only treasurer-like member in the fixture
        let notes = f.db.list_notifications(1, false).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, "payment_verified");
        assert_eq!(notes[0].class_id, f.class_id);
        assert!(notes[0].body.contains("MATCH_OK"));
    }
}
