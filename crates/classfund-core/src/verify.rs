//! Auto-verification decision engine.
//!
//! A pure function over the expected payment, the OCR extraction and the
//! class fund account. No clock, no database, no ambient config — everything
//! the rules need arrives as an argument, so the engine is unit-testable
//! against literal fixtures.
//!
//! Rules run in order and the first failure short-circuits:
//! amount tolerance, payee account tail, transaction reference presence,
//! transfer note matching.

use serde::Serialize;

use crate::config::VerifyConfig;
use crate::models::FundAccount;
use crate::ocr::OcrExtraction;

/// Machine-readable outcome codes, covering both engine rules and the
/// pipeline's own failure modes. Stored verbatim on the payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReasonCode {
    MatchOk,
    AmountMismatch,
    PayeeMismatch,
    NoTxnRef,
    NoNote,
    NoteMismatch,
    /// Soft warning only: note present but unmatched while notes are optional
    NoteWeak,
    // Pipeline outcomes (never produced by `decide`)
    ProofNotFound,
    OcrError,
    OcrEmpty,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchOk => "MATCH_OK",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::PayeeMismatch => "PAYEE_MISMATCH",
            Self::NoTxnRef => "NO_TXN_REF",
            Self::NoNote => "NO_NOTE",
            Self::NoteMismatch => "NOTE_MISMATCH",
            Self::NoteWeak => "NOTE_WEAK",
            Self::ProofNotFound => "PROOF_NOT_FOUND",
            Self::OcrError => "OCR_ERROR",
            Self::OcrEmpty => "OCR_EMPTY",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the decision engine
#[derive(Debug, Clone)]
pub struct Decision {
    pub pass: bool,
    pub code: ReasonCode,
    /// Human/debug detail; a JSON diagnostic blob on success
    pub detail: String,
}

impl Decision {
    fn fail(code: ReasonCode, detail: String) -> Self {
        Self {
            pass: false,
            code,
            detail,
        }
    }
}

/// Decide whether an extracted payment proof matches the expected payment.
pub fn decide(
    expected_amount: i64,
    payer_name: &str,
    invoice_id: i64,
    ocr: &OcrExtraction,
    fund: Option<&FundAccount>,
    cfg: &VerifyConfig,
) -> Decision {
    let found = ocr.amount.unwrap_or(0);

    // ---- Amount check (hard) ----
    if !amount_ok(
        expected_amount,
        found,
        cfg.amount_tolerance_abs,
        cfg.amount_tolerance_pct,
    ) {
        return Decision::fail(
            ReasonCode::AmountMismatch,
            format!(
                "expected={}, ocr={}, tol_abs={}, tol_pct={}",
                expected_amount, found, cfg.amount_tolerance_abs, cfg.amount_tolerance_pct
            ),
        );
    }

    // ---- Payee account check (optional hard) ----
    if cfg.require_payee_match {
        if let Some(fund) = fund.filter(|f| !f.account_number.is_empty()) {
            let ocr_account = ocr.payee_account.as_deref().unwrap_or("").trim();
            if !ocr_account.is_empty() {
                // compare trailing digits only; OCR mangles spacing and
                // prefixes far more often than the account tail
                let expect_tail = digit_tail(&fund.account_number, cfg.payee_tail_len);
                let found_tail = digit_tail(ocr_account, cfg.payee_tail_len);
                if expect_tail.is_empty() || expect_tail != found_tail {
                    return Decision::fail(
                        ReasonCode::PayeeMismatch,
                        format!("fund_tail={}, ocr_tail={}", expect_tail, found_tail),
                    );
                }
            }
        }
    }

    // ---- Transaction ref check (optional hard) ----
    if cfg.require_txn_ref && ocr.txn_ref.as_deref().unwrap_or("").trim().is_empty() {
        return Decision::fail(ReasonCode::NoTxnRef, "missing txn_ref".into());
    }

    // ---- Transfer note check ----
    let note = ocr.note.as_deref().unwrap_or("").trim();
    let mut soft_warn = None;

    if cfg.require_note {
        if note.is_empty() {
            return Decision::fail(ReasonCode::NoNote, "transfer note is empty".into());
        }
        if !note_matches(invoice_id, payer_name, note, &cfg.note_must_include) {
            return Decision::fail(
                ReasonCode::NoteMismatch,
                format!("note='{}' not matched", note),
            );
        }
    } else if !note.is_empty() && !note_matches(invoice_id, payer_name, note, &cfg.note_must_include)
    {
        soft_warn = Some(ReasonCode::NoteWeak);
    }

    let detail = serde_json::json!({
        "expect": expected_amount,
        "found": found,
        "txn_ref": ocr.txn_ref,
        "note": if note.is_empty() { None } else { Some(note) },
        "soft_warn": soft_warn.map(|w| w.as_str()),
    });

    Decision {
        pass: true,
        code: ReasonCode::MatchOk,
        detail: detail.to_string(),
    }
}

/// Amount rule: found must be positive; pass on either configured tolerance,
/// exact equality when both are off.
fn amount_ok(expect: i64, found: i64, abs_tol: i64, pct_tol: f64) -> bool {
    if found <= 0 {
        return false;
    }
    let delta = (expect - found).abs();
    if abs_tol > 0 && delta <= abs_tol {
        return true;
    }
    if pct_tol > 0.0 {
        let delta_pct = delta as f64 / expect.max(1) as f64;
        return delta_pct <= pct_tol;
    }
    expect == found
}

/// Last `len` digits of a string after stripping everything non-numeric
fn digit_tail(s: &str, len: usize) -> String {
    let digits: Vec<char> = s.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(len);
    digits[start..].iter().collect()
}

/// Transfer note matching: normalize both sides and accept if the note
/// contains any expected token — the invoice id (as `lop {id}` or
/// `invoice {id}`), the payer's display name, or a configured keyword.
fn note_matches(invoice_id: i64, payer_name: &str, note: &str, extra: &[String]) -> bool {
    let norm = normalize(note);

    let mut tokens = vec![
        format!("lop {}", invoice_id),
        format!("invoice {}", invoice_id),
        normalize(payer_name),
    ];
    for kw in extra {
        tokens.push(normalize(kw));
    }
    tokens.retain(|t| !t.is_empty());
    tokens.dedup();

    tokens.iter().any(|t| norm.contains(t.as_str()))
}

/// Normalize for matching: fold diacritics to ASCII, lowercase, collapse
/// whitespace runs to single spaces.
pub(crate) fn normalize(s: &str) -> String {
    let mut folded = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() {
            folded.push(c.to_ascii_lowercase());
        } else {
            folded.push_str(fold_char(c));
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// ASCII fold for the Latin letters that show up in Vietnamese transfer
/// notes and names. Unknown non-ASCII characters are dropped.
fn fold_char(c: char) -> &'static str {
    match c {
        'à' | 'á' | 'ạ' | 'ả' | 'ã' | 'â' | 'ầ' | 'ấ' | 'ậ' | 'ẩ' | 'ẫ' | 'ă' | 'ằ' | 'ắ'
        | 'ặ' | 'ẳ' | 'ẵ' | 'À' | 'Á' | 'Ạ' | 'Ả' | 'Ã' | 'Â' | 'Ầ' | 'Ấ' | 'Ậ' | 'Ẩ' | 'Ẫ'
        | 'Ă' | 'Ằ' | 'Ắ' | 'Ặ' | 'Ẳ' | 'Ẵ' => "a",
        'è' | 'é' | 'ẹ' | 'ẻ' | 'ẽ' | 'ê' | 'ề' | 'ế' | 'ệ' | 'ể' | 'ễ' | 'È' | 'É' | 'Ẹ'
        | 'Ẻ' | 'Ẽ' | 'Ê' | 'Ề' | 'Ế' | 'Ệ' | 'Ể' | 'Ễ' => "e",
        'ì' | 'í' | 'ị' | 'ỉ' | 'ĩ' | 'Ì' | 'Í' | 'Ị' | 'Ỉ' | 'Ĩ' => "i",
        'ò' | 'ó' | 'ọ' | 'ỏ' | 'õ' | 'ô' | 'ồ' | 'ố' | 'ộ' | 'ổ' | 'ỗ' | 'ơ' | 'ờ' | 'ớ'
        | 'ợ' | 'ở' | 'ỡ' | 'Ò' | 'Ó' | 'Ọ' | 'Ỏ' | 'Õ' | 'Ô' | 'Ồ' | 'Ố' | 'Ộ' | 'Ổ' | 'Ỗ'
        | 'Ơ' | 'Ờ' | 'Ớ' | 'Ợ' | 'Ở' | 'Ỡ' => "o",
        'ù' | 'ú' | 'ụ' | 'ủ' | 'ũ' | 'ư' | 'ừ' | 'ứ' | 'ự' | 'ử' | 'ữ' | 'Ù' | 'Ú' | 'Ụ'
        | 'Ủ' | 'Ũ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ự' | 'Ử' | 'Ữ' => "u",
        'ỳ' | 'ý' | 'ỵ' | 'ỷ' | 'ỹ' | 'Ỳ' | 'Ý' | 'Ỵ' | 'Ỷ' | 'Ỹ' => "y",
        'đ' | 'Đ' => "d",
        _ => "",
    }
}
