//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rusqlite::params;

    /// One class with an owner and two ordinary members, an active cycle and
    /// generated invoices
    struct Fixture {
        db: Database,
        class_id: i64,
        owner_user: i64,
        payer_user: i64,
        payer_member: i64,
        cycle_id: i64,
        payer_invoice: i64,
    }

    fn fixture(amount_per_member: i64) -> Fixture {
        let db = Database::in_memory().unwrap();

        let owner_user = db.create_user("Chu Nhiem", "owner@example.com", None).unwrap();
        let payer_user = db
            .create_user("Nguyen Van A", "a@example.com", Some("0900000001"))
            .unwrap();
        let class = db.create_class("10A1", owner_user).unwrap();
        let payer_member = db.join_class(class.id, payer_user).unwrap();

        let cycle = db
            .create_fee_cycle(&NewFeeCycle {
                class_id: class.id,
                name: "Thang 9".into(),
                term: Some("2025-1".into()),
                amount_per_member,
                due_date: None,
                status: CycleStatus::Active,
                allow_late: true,
            })
            .unwrap();
        db.generate_invoices(cycle.id, None).unwrap();

        let payer_invoice = db.my_invoices(payer_member.id).unwrap().remove(0).id;

        Fixture {
            db,
            class_id: class.id,
            owner_user,
            payer_user,
            payer_member: payer_member.id,
            cycle_id: cycle.id,
            payer_invoice,
        }
    }

    fn submit_payment(f: &Fixture, amount: i64) -> i64 {
        let payment = f
            .db
            .create_payment(&NewPayment {
                invoice_id: f.payer_invoice,
                payer_id: f.payer_member,
                amount,
                method: PayMethod::Bank,
                txn_ref: None,
            })
            .unwrap();
        f.db.bump_invoice_submitted(f.payer_invoice).unwrap();
        payment.id
    }

    fn add_expense(f: &Fixture, title: &str, amount: i64) -> i64 {
        f.db.create_expense(&NewExpense {
            class_id: f.class_id,
            fee_cycle_id: Some(f.cycle_id),
            title: title.into(),
            amount,
            note: None,
            spent_at: None,
            created_by: f.owner_user,
        })
        .unwrap()
        .id
    }

    #[test]
    fn test_schema_initializes() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('users','classes','class_members','fund_accounts','fee_cycles',
                  'invoices','payments','expenses','notifications')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 9);
    }

    #[test]
    fn test_class_creation_makes_owner_member() {
        let f = fixture(100_000);
        assert_eq!(
            f.db.role_in_class(f.owner_user, f.class_id).unwrap(),
            Some(ClassRole::Owner)
        );
        assert_eq!(
            f.db.role_in_class(f.payer_user, f.class_id).unwrap(),
            Some(ClassRole::Member)
        );
        assert_eq!(f.db.role_in_class(9999, f.class_id).unwrap(), None);
    }

    #[test]
    fn test_join_by_code_and_rejoin() {
        let f = fixture(100_000);
        let class = f.db.get_class(f.class_id).unwrap().unwrap();
        assert_eq!(class.code.len(), 6);

        let found = f.db.find_class_by_code(&class.code).unwrap().unwrap();
        assert_eq!(found.id, f.class_id);

        // re-joining keeps the existing membership and role
        f.db.set_member_role(f.class_id, f.payer_user, ClassRole::Treasurer)
            .unwrap();
        let again = f.db.join_class(f.class_id, f.payer_user).unwrap();
        assert_eq!(again.role, ClassRole::Treasurer);
    }

    #[test]
    fn test_owner_role_not_assignable_directly() {
        let f = fixture(100_000);
        assert!(f
            .db
            .set_member_role(f.class_id, f.payer_user, ClassRole::Owner)
            .is_err());
    }

    #[test]
    fn test_transfer_ownership_demotes_old_owner() {
        let f = fixture(100_000);
        f.db.transfer_ownership(f.class_id, f.owner_user, f.payer_user)
            .unwrap();

        assert_eq!(
            f.db.role_in_class(f.payer_user, f.class_id).unwrap(),
            Some(ClassRole::Owner)
        );
        assert_eq!(
            f.db.role_in_class(f.owner_user, f.class_id).unwrap(),
            Some(ClassRole::Treasurer)
        );
        let class = f.db.get_class(f.class_id).unwrap().unwrap();
        assert_eq!(class.owner_id, f.payer_user);
    }

    #[test]
    fn test_fund_account_upsert_is_single_row() {
        let f = fixture(100_000);
        f.db.upsert_fund_account(f.class_id, "vcb", "0011223344", "Quy Lop 10A1")
            .unwrap();
        let fund = f
            .db
            .upsert_fund_account(f.class_id, "tcb", "9988776655", "Quy Lop 10A1")
            .unwrap();

        assert_eq!(fund.bank_code, "TCB");
        assert_eq!(fund.account_number, "9988776655");

        let conn = f.db.conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fund_accounts WHERE class_id = ?",
                params![f.class_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_generate_invoices_is_idempotent() {
        let f = fixture(150_000);
        // fixture already generated: owner + payer = 2 invoices
        let second = f.db.generate_invoices(f.cycle_id, None).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 2);

        // a new member gets picked up by a later run
        let new_user = f.db.create_user("Tran Thi B", "b@example.com", None).unwrap();
        f.db.join_class(f.class_id, new_user).unwrap();
        let third = f.db.generate_invoices(f.cycle_id, None).unwrap();
        assert_eq!(third.created, 1);
        assert_eq!(third.skipped, 2);
        assert_eq!(third.total_members, 3);
    }

    #[test]
    fn test_invoice_unique_per_cycle_and_member() {
        let f = fixture(150_000);
        let conn = f.db.conn().unwrap();
        let result = conn.execute(
            "INSERT INTO invoices (fee_cycle_id, member_id, amount) VALUES (?, ?, 100)",
            params![f.cycle_id, f.payer_member],
        );
        assert!(result.is_err(), "duplicate invoice must violate uniqueness");
    }

    #[test]
    fn test_manual_approve_promotes_invoice_when_covered() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 120_000);
        let p2 = submit_payment(&f, 80_000);

        f.db.verify_manual(p1, f.owner_user, true).unwrap();
        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Submitted); // 120k < 200k

        let verified = f.db.verify_manual(p2, f.owner_user, true).unwrap();
        assert_eq!(verified.status, PaymentStatus::Verified);
        assert_eq!(verified.verified_by, Some(f.owner_user));

        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Verified); // 200k >= 200k
    }

    #[test]
    fn test_manual_verdict_requires_submitted_status() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();

        // double-approve and late reject are conflicts, not overwrites
        assert!(matches!(
            f.db.verify_manual(p, f.owner_user, true),
            Err(crate::error::Error::Conflict(_))
        ));
        assert!(matches!(
            f.db.verify_manual(p, f.owner_user, false),
            Err(crate::error::Error::Conflict(_))
        ));
    }

    #[test]
    fn test_reject_does_not_touch_invoice() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        let rejected = f.db.verify_manual(p, f.owner_user, false).unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);

        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Submitted);
    }

    #[test]
    fn test_invalidation_regresses_invoice_to_unpaid() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        assert_eq!(
            f.db.get_invoice(f.payer_invoice).unwrap().unwrap().status,
            InvoiceStatus::Verified
        );

        let invalid = f
            .db
            .invalidate_payment(p, f.owner_user, "wrong proof", Some("screenshot reused"))
            .unwrap();
        assert_eq!(invalid.status, PaymentStatus::Invalid);
        assert_eq!(invalid.invalidated_by, Some(f.owner_user));
        assert_eq!(invalid.invalid_reason.as_deref(), Some("wrong proof"));
        assert!(invalid.invalidated_at.is_some());

        // no submitted payments remain, so the invoice falls all the way back
        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(invoice.paid_at, None);
    }

    #[test]
    fn test_invalidation_regresses_to_submitted_when_another_payment_waits() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 200_000);
        f.db.verify_manual(p1, f.owner_user, true).unwrap();
        let _p2 = submit_payment(&f, 200_000); // still submitted

        f.db.invalidate_payment(p1, f.owner_user, "duplicate", None)
            .unwrap();

        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Submitted);
    }

    #[test]
    fn test_invalidation_keeps_invoice_verified_when_still_covered() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 200_000);
        let p2 = submit_payment(&f, 200_000); // duplicate submission
        f.db.verify_manual(p1, f.owner_user, true).unwrap();
        f.db.verify_manual(p2, f.owner_user, true).unwrap();

        f.db.invalidate_payment(p1, f.owner_user, "duplicate", None)
            .unwrap();

        // p2 alone still covers the invoice
        let invoice = f.db.get_invoice(f.payer_invoice).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Verified);
    }

    #[test]
    fn test_invalid_is_terminal_and_needs_verified() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);

        // not yet verified -> cannot invalidate
        assert!(matches!(
            f.db.invalidate_payment(p, f.owner_user, "x", None),
            Err(crate::error::Error::InvalidTransition { .. })
        ));

        f.db.verify_manual(p, f.owner_user, true).unwrap();
        f.db.invalidate_payment(p, f.owner_user, "x", None).unwrap();

        // no un-invalidate of any kind
        assert!(f.db.invalidate_payment(p, f.owner_user, "y", None).is_err());
        assert!(f.db.verify_manual(p, f.owner_user, true).is_err());
    }

    #[test]
    fn test_mark_paid_follows_transition_table() {
        let f = fixture(200_000);

        // unpaid -> paid is not a legal edge
        assert!(matches!(
            f.db.mark_invoice_paid(f.payer_invoice),
            Err(crate::error::Error::InvalidTransition { .. })
        ));

        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        let invoice = f.db.mark_invoice_paid(f.payer_invoice).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());
    }

    #[test]
    fn test_invoice_detail_sums_and_capabilities() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 120_000);
        submit_payment(&f, 50_000);
        f.db.verify_manual(p1, f.owner_user, true).unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 9, 20).unwrap();
        let detail = f.db.invoice_detail(f.payer_invoice, true, false, today).unwrap();
        assert_eq!(detail.sum_verified, 120_000);
        assert_eq!(detail.sum_submitted, 50_000);
        assert!(detail.can_submit);
        assert!(!detail.can_mark_paid);
    }

    #[test]
    fn test_invoice_detail_due_date_locks_submission() {
        let f = fixture(200_000);
        let conn = f.db.conn().unwrap();
        conn.execute(
            "UPDATE fee_cycles SET due_date = '2025-09-15', allow_late = 0 WHERE id = ?",
            params![f.cycle_id],
        )
        .unwrap();
        drop(conn);

        let before = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 9, 16).unwrap();

        assert!(f
            .db
            .invoice_detail(f.payer_invoice, true, false, before)
            .unwrap()
            .can_submit);
        assert!(!f
            .db
            .invoice_detail(f.payer_invoice, true, false, after)
            .unwrap()
            .can_submit);

        // allow_late reopens the window
        let conn = f.db.conn().unwrap();
        conn.execute(
            "UPDATE fee_cycles SET allow_late = 1 WHERE id = ?",
            params![f.cycle_id],
        )
        .unwrap();
        drop(conn);
        assert!(f
            .db
            .invoice_detail(f.payer_invoice, true, false, after)
            .unwrap()
            .can_submit);
    }

    #[test]
    fn test_unpaid_members_orders_submitted_first() {
        let f = fixture(200_000);
        // a second unsettled member exists (the owner's own invoice)
        submit_payment(&f, 50_000); // payer invoice -> submitted

        let rows = f.db.unpaid_members(f.cycle_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, InvoiceStatus::Submitted);
        assert_eq!(rows[0].user_name, "Nguyen Van A");
        assert!(rows[0].last_submitted_at.is_some());
        assert_eq!(rows[1].status, InvoiceStatus::Unpaid);
    }

    #[test]
    fn test_list_payments_ai_failed_filter() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 200_000);
        let _p2 = submit_payment(&f, 200_000);
        f.db.record_auto_failure(p1, "AMOUNT_MISMATCH", "expected=200000, ocr=100")
            .unwrap();

        let all = f.db.list_payments(f.class_id, Some(PaymentStatus::Submitted), false).unwrap();
        assert_eq!(all.len(), 2);

        let failed = f.db.list_payments(f.class_id, None, true).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, p1);
        assert_eq!(failed[0].verify_reason_code.as_deref(), Some("AMOUNT_MISMATCH"));
        assert_eq!(failed[0].payer_name, "Nguyen Van A");
        assert_eq!(failed[0].cycle_name, "Thang 9");
    }

    #[test]
    fn test_approved_and_invalid_lists() {
        let f = fixture(200_000);
        let p1 = submit_payment(&f, 200_000);
        f.db.verify_manual(p1, f.owner_user, true).unwrap();

        let approved = f
            .db
            .approved_payments(f.class_id, Some(f.cycle_id), None, None, None)
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].verified_by_name.as_deref(), Some("Chu Nhiem"));

        f.db.invalidate_payment(p1, f.owner_user, "bad", None).unwrap();
        assert!(f
            .db
            .approved_payments(f.class_id, None, None, None, None)
            .unwrap()
            .is_empty());

        let invalid = f.db.invalid_payments(f.class_id).unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].invalid_reason.as_deref(), Some("bad"));
    }

    #[test]
    fn test_ledger_round_trip_without_reversal() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        add_expense(&f, "Mua bong", 50_000);

        let report = f.db.ledger(f.class_id, &LedgerFilter::default()).unwrap();
        assert_eq!(report.total_income, 200_000);
        assert_eq!(report.total_expense, 50_000);
        assert_eq!(report.invalid_total, 0);
        assert_eq!(report.closing_balance, 150_000);
        assert_eq!(report.items.len(), 2);

        // same-second tie still orders income before expense
        assert_eq!(report.items[0].kind, LedgerEntryKind::Payment);
        assert_eq!(report.items[0].balance_after, 200_000);
        assert_eq!(report.items[1].kind, LedgerEntryKind::Expense);
        assert_eq!(report.items[1].balance_after, 150_000);
    }

    #[test]
    fn test_ledger_reversal_adds_line_and_keeps_income() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        add_expense(&f, "Mua bong", 50_000);

        let before = f.db.ledger(f.class_id, &LedgerFilter::default()).unwrap();

        f.db.invalidate_payment(p, f.owner_user, "wrong proof", None)
            .unwrap();
        let after = f.db.ledger(f.class_id, &LedgerFilter::default()).unwrap();

        // exactly one line was added; the income line survives
        assert_eq!(after.items.len(), before.items.len() + 1);
        assert!(after
            .items
            .iter()
            .any(|i| i.kind == LedgerEntryKind::Payment && i.id == p));
        let reversal = after
            .items
            .iter()
            .find(|i| i.kind == LedgerEntryKind::InvalidPayment)
            .unwrap();
        assert_eq!(reversal.id, p);
        assert!(!reversal.is_income);
        assert!(reversal.note.contains("wrong proof"));

        assert_eq!(after.total_income, 200_000);
        assert_eq!(after.total_expense, 250_000);
        assert_eq!(after.invalid_total, 200_000);
        assert_eq!(after.closing_balance, -50_000);
    }

    #[test]
    fn test_ledger_date_filter_and_ordering() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        let e = add_expense(&f, "Photo", 30_000);

        // pin distinct timestamps so chronology is under test control
        let conn = f.db.conn().unwrap();
        conn.execute(
            "UPDATE payments SET verified_at = '2025-09-02 08:00:00' WHERE id = ?",
            params![p],
        )
        .unwrap();
        conn.execute(
            "UPDATE expenses SET spent_at = '2025-09-01' WHERE id = ?",
            params![e],
        )
        .unwrap();
        drop(conn);

        let report = f.db.ledger(f.class_id, &LedgerFilter::default()).unwrap();
        assert_eq!(report.items[0].kind, LedgerEntryKind::Expense); // Sep 1
        assert_eq!(report.items[1].kind, LedgerEntryKind::Payment); // Sep 2
        assert_eq!(report.items[0].balance_after, -30_000);
        assert_eq!(report.items[1].balance_after, 170_000);

        let narrowed = f
            .db
            .ledger(
                f.class_id,
                &LedgerFilter {
                    fee_cycle_id: None,
                    from: Some(NaiveDate::from_ymd_opt(2025, 9, 2).unwrap()),
                    to: None,
                },
            )
            .unwrap();
        assert_eq!(narrowed.items.len(), 1);
        assert_eq!(narrowed.items[0].kind, LedgerEntryKind::Payment);
    }

    #[test]
    fn test_fund_summary_matches_ledger() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        add_expense(&f, "Nuoc uong", 20_000);

        let summary = f.db.fund_summary(f.class_id, &LedgerFilter::default()).unwrap();
        assert_eq!(summary.total_income, 200_000);
        assert_eq!(summary.total_expense, 20_000);
        assert_eq!(summary.balance, 180_000);
    }

    #[test]
    fn test_cycle_report_expected_vs_collected() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.verify_manual(p, f.owner_user, true).unwrap();
        add_expense(&f, "Trang tri", 80_000);

        let report = f.db.cycle_report(f.class_id, f.cycle_id).unwrap();
        assert_eq!(report.active_members, 2);
        assert_eq!(report.expected_total, 400_000);
        assert_eq!(report.total_income, 200_000);
        assert_eq!(report.total_expense, 80_000);
        assert_eq!(report.balance, 120_000);
        assert_eq!(report.verified_total, 200_000); // payer invoice amount
        assert_eq!(report.unpaid_total, 200_000); // owner invoice amount
    }

    #[test]
    fn test_expense_cycle_must_belong_to_class() {
        let f = fixture(100_000);
        let other_owner = f.db.create_user("X", "x@example.com", None).unwrap();
        let other_class = f.db.create_class("11B2", other_owner).unwrap();
        let other_cycle = f
            .db
            .create_fee_cycle(&NewFeeCycle {
                class_id: other_class.id,
                name: "K1".into(),
                term: None,
                amount_per_member: 1000,
                due_date: None,
                status: CycleStatus::Active,
                allow_late: true,
            })
            .unwrap();

        let result = f.db.create_expense(&NewExpense {
            class_id: f.class_id,
            fee_cycle_id: Some(other_cycle.id),
            title: "Bad".into(),
            amount: 10,
            note: None,
            spent_at: None,
            created_by: f.owner_user,
        });
        assert!(matches!(result, Err(crate::error::Error::InvalidData(_))));
    }

    #[test]
    fn test_expense_update_and_delete() {
        let f = fixture(100_000);
        let id = add_expense(&f, "Ban dau", 10_000);

        let updated = f
            .db
            .update_expense(id, "Sua lai", 12_000, None, Some("ghi chu"), None)
            .unwrap();
        assert_eq!(updated.title, "Sua lai");
        assert_eq!(updated.amount, 12_000);
        assert_eq!(updated.fee_cycle_id, None);

        f.db.set_expense_receipt(id, "receipts/abc.jpg").unwrap();
        let receipt = f.db.delete_expense(id).unwrap();
        assert_eq!(receipt.as_deref(), Some("receipts/abc.jpg"));
        assert!(f.db.get_expense(id).unwrap().is_none());
    }

    #[test]
    fn test_proof_replacement_requires_submitted() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 200_000);
        f.db.set_proof_path(p, "proofs/one.jpg").unwrap();

        f.db.verify_manual(p, f.owner_user, true).unwrap();
        assert!(matches!(
            f.db.set_proof_path(p, "proofs/two.jpg"),
            Err(crate::error::Error::Conflict(_))
        ));
    }

    #[test]
    fn test_notifications_roundtrip() {
        let f = fixture(100_000);
        f.db.set_member_role(f.class_id, f.payer_user, ClassRole::Treasurer)
            .unwrap();

        let sent = f
            .db
            .notify_treasurers(f.class_id, "payment_verified", "ok", "Payment #1")
            .unwrap();
        assert_eq!(sent, 2); // owner + treasurer

        let unread = f.db.list_notifications(f.payer_user, true).unwrap();
        assert_eq!(unread.len(), 1);
        f.db.mark_notification_read(unread[0].id, f.payer_user).unwrap();
        assert!(f.db.list_notifications(f.payer_user, true).unwrap().is_empty());
        assert_eq!(f.db.list_notifications(f.payer_user, false).unwrap().len(), 1);
    }

    #[test]
    fn test_payment_context_joins_everything() {
        let f = fixture(200_000);
        let p = submit_payment(&f, 150_000);

        let ctx = f.db.payment_context(p).unwrap().unwrap();
        assert_eq!(ctx.payment.id, p);
        assert_eq!(ctx.invoice_amount, 200_000);
        assert_eq!(ctx.invoice_status, InvoiceStatus::Submitted);
        assert_eq!(ctx.fee_cycle_id, f.cycle_id);
        assert_eq!(ctx.class_id, f.class_id);
        assert_eq!(ctx.payer_name, "Nguyen Van A");

        assert!(f.db.payment_context(404_404).unwrap().is_none());
        assert!(f.db.payment_in_class(p, f.class_id).unwrap());
        assert!(!f.db.payment_in_class(p, f.class_id + 1).unwrap());
    }
}
