use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionPaymentStatus {
    Pending,
    Partial,
    Paid,
    Failed,
    Refunded,
}

impl TransactionPaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionPaymentStatus::Pending => "Pending",
            TransactionPaymentStatus::Partial => "Partial",
            TransactionPaymentStatus::Paid => "Paid",
            TransactionPaymentStatus::Failed => "Failed",
            TransactionPaymentStatus::Refunded => "Refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BookingStatus {
    BookingPending,
    BookingPaid,
    BookingRejected,
    BookingExpired,
    BookingCancelled,
    BookingRefunded,
}

impl BookingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::BookingPending => "Booking Pending",
            BookingStatus::BookingPaid => "Booking Paid",
            BookingStatus::BookingRejected => "Booking Rejected",
            BookingStatus::BookingExpired => "Booking Expired",
            BookingStatus::BookingCancelled => "Booking Cancelled",
            BookingStatus::BookingRefunded => "Booking Refund",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FinalPaymentMethod {
    Full,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub invoice_number: String,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub car_id: i64,
    pub car_price: i64,
    pub booking_fee: i64,
    pub total_amount: i64,
    pub payment_method: Option<String>,
    pub payment_status: TransactionPaymentStatus,
    pub status: TransactionStatus,
    pub booking_status: BookingStatus,
    pub booking_expires_at: Option<NaiveDateTime>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub booking_rejected_at: Option<NaiveDateTime>,
    pub final_payment_method: Option<FinalPaymentMethod>,
    pub final_payment_completed_at: Option<NaiveDateTime>,
    pub handover_at: Option<NaiveDateTime>,
    pub handover_photo: Option<String>,
    pub handover_notes: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancellation_reason: Option<String>,
    pub refunded_at: Option<NaiveDateTime>,
    pub refund_amount: Option<i64>,
    pub refund_proof: Option<String>,
    pub notes: Option<String>,
    /// Optimistic lock, bumped on every write.
    pub version: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Transaction {
    pub fn is_party(&self, user_id: i64) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// A booking that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub invoice_number: String,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub car_id: i64,
    pub car_price: i64,
    pub booking_fee: i64,
    pub total_amount: i64,
    pub payment_method: Option<String>,
    pub booking_expires_at: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub booking_status: Option<BookingStatus>,
    pub payment_status: Option<TransactionPaymentStatus>,
    pub buyer_id: Option<i64>,
    pub seller_id: Option<i64>,
    /// Invoice number fragment.
    pub search: Option<String>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
}
