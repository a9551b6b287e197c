//! Auto-verification tunables.
//!
//! The decision engine never reads ambient configuration: a [`VerifyConfig`]
//! value is loaded once and passed explicitly into
//! [`decide`](crate::verify::decide), so tests can run against literal
//! fixtures.
//!
//! ## Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for an override file (`CLASSFUND_VERIFY_CONFIG`, then
//!    `~/.local/share/classfund/config/verify.toml`)
//! 2. Fall back to embedded defaults (compiled into the binary)

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/verify.toml");

/// Tunables consumed by the decision engine
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyConfig {
    /// Absolute amount tolerance in currency units (0 disables)
    pub amount_tolerance_abs: i64,
    /// Relative amount tolerance as a fraction of the expected amount
    /// (0.0 disables; when both tolerances are off, exact match is required)
    pub amount_tolerance_pct: f64,
    /// Compare the extracted payee account tail against the fund account
    pub require_payee_match: bool,
    /// Number of trailing account digits to compare
    pub payee_tail_len: usize,
    /// Require a transaction reference in the extraction
    pub require_txn_ref: bool,
    /// Require a transfer note naming the invoice, payer or a keyword
    pub require_note: bool,
    /// Extra accepted note keywords, class- or deployment-specific
    pub note_must_include: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        // The embedded file is the source of truth for defaults; a broken
        // embedded config is a build defect, caught by tests.
        Self::from_toml(DEFAULT_CONFIG).expect("embedded verify.toml is valid")
    }
}

// On-disk layout of verify.toml
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    amount: AmountSection,
    #[serde(default)]
    payee: PayeeSection,
    #[serde(default)]
    txn_ref: TxnRefSection,
    #[serde(default)]
    note: NoteSection,
}

#[derive(Debug, Deserialize)]
struct AmountSection {
    #[serde(default)]
    tolerance_abs: i64,
    #[serde(default)]
    tolerance_pct: f64,
}

impl Default for AmountSection {
    fn default() -> Self {
        Self {
            tolerance_abs: 0,
            tolerance_pct: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PayeeSection {
    #[serde(default)]
    require_match: bool,
    #[serde(default = "default_tail_len")]
    tail_len: usize,
}

impl Default for PayeeSection {
    fn default() -> Self {
        Self {
            require_match: false,
            tail_len: default_tail_len(),
        }
    }
}

fn default_tail_len() -> usize {
    6
}

#[derive(Debug, Deserialize, Default)]
struct TxnRefSection {
    #[serde(default)]
    require: bool,
}

#[derive(Debug, Deserialize)]
struct NoteSection {
    #[serde(default = "default_true")]
    require: bool,
    #[serde(default)]
    must_include: Vec<String>,
}

impl Default for NoteSection {
    fn default() -> Self {
        Self {
            require: true,
            must_include: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

impl VerifyConfig {
    /// Parse a verify.toml document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("invalid verify config: {}", e)))?;

        if file.amount.tolerance_abs < 0 {
            return Err(Error::Config(
                "amount.tolerance_abs must not be negative".into(),
            ));
        }
        if file.amount.tolerance_pct < 0.0 {
            return Err(Error::Config(
                "amount.tolerance_pct must not be negative".into(),
            ));
        }

        Ok(Self {
            amount_tolerance_abs: file.amount.tolerance_abs,
            amount_tolerance_pct: file.amount.tolerance_pct,
            require_payee_match: file.payee.require_match,
            payee_tail_len: file.payee.tail_len,
            require_txn_ref: file.txn_ref.require,
            require_note: file.note.require,
            note_must_include: file.note.must_include,
        })
    }

    /// Load the config, honoring an override file when one exists
    pub fn load() -> Self {
        match override_path() {
            Some(path) if path.exists() => match fs::read_to_string(&path) {
                Ok(contents) => match Self::from_toml(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded verify config override");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e,
                            "Ignoring broken verify config override");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "Failed to read verify config override");
                }
            },
            _ => {}
        }
        Self::default()
    }
}

/// Where an override file would live:
/// `CLASSFUND_VERIFY_CONFIG` or `<data dir>/classfund/config/verify.toml`
fn override_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLASSFUND_VERIFY_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::data_dir().map(|d| d.join("classfund").join("config").join("verify.toml"))
}
