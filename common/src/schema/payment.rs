use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentType {
    BookingFee,
    DownPayment,
    Installment,
    FullPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    /// Proof attached, waiting for an admin.
    Uploaded,
    Processing,
    Success,
    Rejected,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    /// Still waiting on a verification decision.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Uploaded | PaymentStatus::Processing
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub transaction_id: i64,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub payment_method: String,
    pub reference_code: String,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,
    pub status: PaymentStatus,
    pub proof_of_payment: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<NaiveDateTime>,
    pub rejection_count: i64,
    pub notes: Option<String>,
    pub payment_date: NaiveDateTime,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Payment {
    pub fn has_proof(&self) -> bool {
        self.proof_of_payment
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }
}

/// A payment that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub transaction_id: i64,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub payment_method: String,
    pub reference_code: String,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,
    pub status: PaymentStatus,
    pub proof_of_payment: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub payment_date: NaiveDateTime,
}

/// Bank details a buyer attaches to a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub payment_method: Option<String>,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,
}
