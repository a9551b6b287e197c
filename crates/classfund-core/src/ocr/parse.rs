//! Field heuristics over recognized proof text.
//!
//! Wallet and banking screenshots are not structured documents; the engine
//! hands back a blob of text and these heuristics pull out the fields the
//! decision engine cares about. They are deliberately loose — a missed
//! field sends the payment to manual review, which is the safe direction.

use std::sync::OnceLock;

use regex::Regex;

use super::OcrExtraction;

/// First digit run of 4+ characters allowing thousand separators, with an
/// optional currency suffix (200.000 / 200000 đ / 200,000 VND)
fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d[\d.,]{3,})\s*(?:đ|vnd|vnđ)?").unwrap())
}

/// Transaction reference: CK/CT/TXN/REF marker followed by the code
fn txn_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:CK|CT|TXN|REF)[\s\-:.]*([A-Z0-9\-]{4,})").unwrap())
}

/// Receiving account marker (STK / so tai khoan / account) and the digits
/// after it, tolerating OCR spacing
fn payee_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:stk|s[oố]\s*tk|t[aà]i\s*kho[aả]n|account)[\s:.]*([\d][\d\s.\-]{5,})")
            .unwrap()
    })
}

/// Turn recognized text into a structured extraction.
///
/// `ok` is true exactly when an amount was found — without one there is
/// nothing to verify.
pub fn extract_fields(raw: &str, confidence: Option<u8>) -> OcrExtraction {
    let raw = raw.trim();
    if raw.is_empty() {
        return OcrExtraction {
            ok: false,
            confidence,
            ..Default::default()
        };
    }

    let amount = amount_re()
        .captures(raw)
        .map(|c| c[1].chars().filter(|ch| ch.is_ascii_digit()).collect::<String>())
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse::<i64>().ok());

    let lower = raw.to_lowercase();
    let method = if lower.contains("momo") {
        Some("momo".to_string())
    } else if lower.contains("zalopay") {
        Some("zalopay".to_string())
    } else if lower.contains("bank") || lower.contains("chuyển khoản") || lower.contains("chuyen khoan") {
        Some("bank".to_string())
    } else {
        None
    };

    let txn_ref = txn_ref_re()
        .captures(raw)
        .map(|c| c[1].to_uppercase());

    let payee_account = payee_account_re()
        .captures(raw)
        .map(|c| c[1].trim().to_string());

    OcrExtraction {
        ok: amount.is_some(),
        raw_text: raw.to_string(),
        amount,
        method,
        txn_ref,
        payee_account,
        // engines that read whole screenshots cannot isolate the note; the
        // full text stands in and the matcher searches inside it
        note: Some(raw.to_string()),
        confidence,
    }
}
