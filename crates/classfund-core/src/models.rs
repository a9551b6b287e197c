//! Domain models for classfund

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A user account. Authentication is handled outside this crate; users exist
/// so memberships and audit fields can name real people.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A class: the fund-sharing group that owns members, cycles and expenses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classroom {
    pub id: i64,
    pub name: String,
    /// Short invite code members use to join
    pub code: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A user's role within one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassRole {
    Owner,
    Treasurer,
    Member,
}

impl ClassRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Treasurer => "treasurer",
            Self::Member => "member",
        }
    }

    /// Owner or treasurer: authorized for financial operations
    pub fn is_treasurer_like(&self) -> bool {
        matches!(self, Self::Owner | Self::Treasurer)
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl std::str::FromStr for ClassRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "treasurer" => Ok(Self::Treasurer),
            "member" => Ok(Self::Member),
            _ => Err(format!("Unknown class role: {}", s)),
        }
    }
}

impl std::fmt::Display for ClassRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership status within a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Left,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Left => "left",
        }
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "left" => Ok(Self::Left),
            _ => Err(format!("Unknown member status: {}", s)),
        }
    }
}

/// A user's membership record in one class.
///
/// "Member" in the rest of the crate means this record, not the user: invoices
/// and payments reference members so a user leaving one class never touches
/// their records elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMember {
    pub id: i64,
    pub class_id: i64,
    pub user_id: i64,
    pub role: ClassRole,
    pub status: MemberStatus,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Bank routing details for a class fund, used by the decision engine for
/// payee matching. At most one per class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundAccount {
    pub id: i64,
    pub class_id: i64,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub created_at: DateTime<Utc>,
}

/// Fee cycle lifecycle. Transitions within the enum are free-form (a
/// treasurer may reopen a closed cycle); invoices pin the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    #[default]
    Draft,
    Active,
    Closed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown cycle status: {}", s)),
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A collection period with a per-member amount and due date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeCycle {
    pub id: i64,
    pub class_id: i64,
    pub name: String,
    pub term: Option<String>,
    /// Integer currency units, never negative
    pub amount_per_member: i64,
    pub due_date: Option<NaiveDate>,
    pub status: CycleStatus,
    /// Whether members may still submit after the due date
    pub allow_late: bool,
    pub created_at: DateTime<Utc>,
}

/// A new fee cycle to create
#[derive(Debug, Clone)]
pub struct NewFeeCycle {
    pub class_id: i64,
    pub name: String,
    pub term: Option<String>,
    pub amount_per_member: i64,
    pub due_date: Option<NaiveDate>,
    pub status: CycleStatus,
    pub allow_late: bool,
}

/// Invoice status: a cached summary of verified payment sums vs the invoice
/// amount. Not monotonic — invalidating a payment regresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Unpaid,
    Submitted,
    Verified,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Paid => "paid",
        }
    }

    /// The invoice transition table.
    ///
    /// Forward edges follow payment activity; the backward edges out of
    /// `verified`/`paid` exist only for the invalidation recompute and are
    /// the one place state moves backward.
    pub fn can_become(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Unpaid, Submitted)
                | (Unpaid, Verified)
                | (Submitted, Verified)
                | (Submitted, Paid)
                | (Verified, Paid)
                | (Verified, Submitted)
                | (Verified, Unpaid)
                | (Paid, Submitted)
                | (Paid, Unpaid)
        )
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(Self::Unpaid),
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "paid" => Ok(Self::Paid),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One member's obligation for one fee cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub fee_cycle_id: i64,
    pub member_id: i64,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayMethod {
    #[default]
    Bank,
    Momo,
    Zalopay,
    Cash,
}

impl PayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Momo => "momo",
            Self::Zalopay => "zalopay",
            Self::Cash => "cash",
        }
    }
}

impl std::str::FromStr for PayMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "momo" => Ok(Self::Momo),
            "zalopay" => Ok(Self::Zalopay),
            "cash" => Ok(Self::Cash),
            _ => Err(format!("Unknown payment method: {}", s)),
        }
    }
}

impl std::fmt::Display for PayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status. `rejected` and `invalid` are terminal; `invalid` is only
/// reachable from `verified` (post-hoc reversal, never deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Submitted,
    Verified,
    Rejected,
    Invalid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Invalid => "invalid",
        }
    }

    /// The payment transition table
    pub fn can_become(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Submitted, Verified) | (Submitted, Rejected) | (Verified, Invalid)
        )
    }

    /// No transition leaves these states
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Invalid)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            "invalid" => Ok(Self::Invalid),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted proof-of-payment against an invoice.
///
/// The row carries three parallel field layers next to the submitted fields —
/// OCR extraction, auto-verification outcome, invalidation — so the full
/// audit history of a payment is reconstructable from a single row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub invoice_id: i64,
    /// The class member who paid
    pub payer_id: i64,
    pub amount: i64,
    pub method: PayMethod,
    pub txn_ref: Option<String>,
    /// Store-relative reference to the proof image
    pub proof_path: Option<String>,
    pub status: PaymentStatus,
    /// NULL for auto-verified payments; set for manual treasurer decisions
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,

    // OCR layer
    pub ocr_raw: Option<String>,
    pub ocr_amount: Option<i64>,
    pub ocr_method: Option<String>,
    pub ocr_txn_ref: Option<String>,
    pub ocr_confidence: Option<u8>,

    // Auto-verification layer
    pub auto_verified: bool,
    pub verify_reason_code: Option<String>,
    pub verify_reason_detail: Option<String>,

    // Invalidation layer
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidated_by: Option<i64>,
    pub invalid_reason: Option<String>,
    pub invalid_note: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A new payment submission (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: i64,
    pub payer_id: i64,
    pub amount: i64,
    pub method: PayMethod,
    pub txn_ref: Option<String>,
}

/// A fund expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub class_id: i64,
    pub fee_cycle_id: Option<i64>,
    pub title: String,
    pub amount: i64,
    pub note: Option<String>,
    /// Date the money actually left the fund; falls back to created_at in
    /// the ledger when absent
    pub spent_at: Option<NaiveDate>,
    pub receipt_path: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new expense to record
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub class_id: i64,
    pub fee_cycle_id: Option<i64>,
    pub title: String,
    pub amount: i64,
    pub note: Option<String>,
    pub spent_at: Option<NaiveDate>,
    pub created_by: i64,
}

/// A persisted notification for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub class_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_roundtrip() {
        for role in [ClassRole::Owner, ClassRole::Treasurer, ClassRole::Member] {
            assert_eq!(role.as_str().parse::<ClassRole>().unwrap(), role);
        }
        assert!("principal".parse::<ClassRole>().is_err());
    }

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus::*;
        assert!(Submitted.can_become(Verified));
        assert!(Submitted.can_become(Rejected));
        assert!(Verified.can_become(Invalid));

        // invalid is terminal, rejected cannot be revived, and invalid is
        // unreachable without going through verified first
        assert!(!Invalid.can_become(Verified));
        assert!(!Invalid.can_become(Submitted));
        assert!(!Rejected.can_become(Verified));
        assert!(!Submitted.can_become(Invalid));
        assert!(Invalid.is_terminal());
        assert!(Rejected.is_terminal());
    }

    #[test]
    fn test_invoice_transitions_allow_regression() {
        use InvoiceStatus::*;
        assert!(Unpaid.can_become(Submitted));
        assert!(Submitted.can_become(Verified));
        assert!(Verified.can_become(Paid));

        // invalidation regression edges
        assert!(Verified.can_become(Submitted));
        assert!(Verified.can_become(Unpaid));
        assert!(Paid.can_become(Unpaid));

        // but never skipping the payment flow forward
        assert!(!Unpaid.can_become(Paid));
        assert!(!Submitted.can_become(Unpaid));
    }
}
