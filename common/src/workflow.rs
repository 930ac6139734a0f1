//! Purchase lifecycle of a car: booking fee, admin confirmation, final
//! payment, handover, plus the cancellation, expiry and refund branches.
//!
//! Every transition is a pure function of the current [`TransactionView`]
//! and returns a [`Transition`] describing the rows to write. The database
//! applies a transition atomically and refuses it when the transaction's
//! `version` moved in the meantime.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::helpers::{invoice_number, non_blank, reference_code};
use crate::refund::{self, RefundRejection, RefundRequest};
use crate::schema::{
    AuthUser, BankDetails, BookingStatus, Car, CarStatus, FinalPaymentMethod, NewPayment,
    NewTransaction, Payment, PaymentStatus, PaymentType, Transaction, TransactionPaymentStatus,
    TransactionStatus,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookingPolicy {
    pub fee_percent: f64,
    pub hold: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        BookingPolicy {
            fee_percent: 5.0,
            hold: Duration::hours(24),
        }
    }
}

/// Whoever triggers a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub is_admin: bool,
}

impl From<&AuthUser> for Actor {
    fn from(user: &AuthUser) -> Self {
        Actor {
            user_id: user.id,
            is_admin: user.is_superuser,
        }
    }
}

impl Actor {
    fn ensure_buyer(&self, tx: &Transaction) -> DomainResult<()> {
        if tx.buyer_id == self.user_id {
            Ok(())
        } else {
            Err(DomainError::forbidden("Only the buyer can do this"))
        }
    }

    fn ensure_seller_or_admin(&self, tx: &Transaction) -> DomainResult<()> {
        if self.is_admin || tx.seller_id == self.user_id {
            Ok(())
        } else {
            Err(DomainError::forbidden("Only the seller or an admin can do this"))
        }
    }

    fn ensure_admin(&self) -> DomainResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(DomainError::forbidden("Only an admin can do this"))
        }
    }

    fn ensure_party_or_admin(&self, tx: &Transaction) -> DomainResult<()> {
        if self.is_admin || tx.is_party(self.user_id) {
            Ok(())
        } else {
            Err(DomainError::forbidden("You are not part of this transaction"))
        }
    }
}

/// Booking fee for a car price: `ceil(price * percent / 100)`, at least 1.
pub fn booking_fee(price: i64, percent: f64) -> i64 {
    let fee = (price as f64 * percent / 100.0).ceil() as i64;
    fee.clamp(1, price.max(1))
}

/// Validates a booking request and builds the row to insert. The database
/// flips the car to `reserved` in the same write.
pub fn new_booking(
    buyer: &Actor,
    car: &Car,
    policy: &BookingPolicy,
    payment_method: Option<String>,
    notes: Option<String>,
    now: NaiveDateTime,
) -> DomainResult<NewTransaction> {
    if car.status != CarStatus::Available {
        return Err(DomainError::state(format!(
            "Car is not available for booking (status: {})",
            car.status.as_str()
        )));
    }
    if car.seller_id == buyer.user_id {
        return Err(DomainError::forbidden("You cannot book your own car"));
    }
    if car.price <= 0 {
        return Err(DomainError::invalid("Car has no valid price"));
    }

    Ok(NewTransaction {
        invoice_number: invoice_number(now),
        buyer_id: buyer.user_id,
        seller_id: car.seller_id,
        car_id: car.id,
        car_price: car.price,
        booking_fee: booking_fee(car.price, policy.fee_percent),
        total_amount: car.price,
        payment_method: non_blank(payment_method),
        booking_expires_at: now + policy.hold,
        notes: non_blank(notes).map(|n| refund::plain_text(&n)),
    })
}

/// A transaction together with all of its payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub payments: Vec<Payment>,
}

/// Conditional car status change: applied only while the car is in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CarChange {
    pub car_id: i64,
    pub from: CarStatus,
    pub to: CarStatus,
}

/// Rows produced by a transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub transaction: Transaction,
    pub payment_updates: Vec<Payment>,
    pub new_payment: Option<NewPayment>,
    pub car_change: Option<CarChange>,
}

impl Transition {
    fn start(view: &TransactionView, now: NaiveDateTime) -> Self {
        let mut transaction = view.transaction.clone();
        transaction.updated_at = Some(now);
        Transition {
            transaction,
            payment_updates: Vec::new(),
            new_payment: None,
            car_change: None,
        }
    }

    fn update_payment(&mut self, payment: Payment) {
        self.payment_updates.retain(|p| p.id != payment.id);
        self.payment_updates.push(payment);
    }

    /// Open payments are dropped once the booking is over.
    fn expire_open_payments(&mut self, view: &TransactionView, now: NaiveDateTime) {
        for payment in view.payments.iter().filter(|p| p.status.is_open()) {
            let mut p = payment.clone();
            p.status = PaymentStatus::Expired;
            p.updated_at = Some(now);
            self.update_payment(p);
        }
    }

    fn release_car(&mut self, view: &TransactionView) {
        if view.holds_car() {
            self.car_change = Some(CarChange {
                car_id: view.transaction.car_id,
                from: CarStatus::Reserved,
                to: CarStatus::Available,
            });
        }
    }
}

/// Lifecycle stage, derived from the header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingBookingFee,
    BookingRejected,
    AwaitingFinalPayment,
    AwaitingHandover,
    HandedOver,
    Cancelled,
    Expired,
    Refunded,
}

/// Status shown for a transaction, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Rejected,
    Refunded,
    Completed,
    Paid,
    AwaitingVerification,
    Unpaid,
    Booking(BookingStatus),
    Transaction(TransactionStatus),
}

impl DisplayStatus {
    pub fn label(&self) -> String {
        match self {
            DisplayStatus::Rejected => "Rejected".into(),
            DisplayStatus::Refunded => "Refunded".into(),
            DisplayStatus::Completed => "Completed".into(),
            DisplayStatus::Paid => "Paid".into(),
            DisplayStatus::AwaitingVerification => "Awaiting Verification".into(),
            DisplayStatus::Unpaid => "Unpaid".into(),
            DisplayStatus::Booking(status) => status
                .label()
                .trim_start_matches("Booking ")
                .to_lowercase(),
            DisplayStatus::Transaction(status) => status.as_str().into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingBadge {
    Unpaid,
    Rejected,
    Status(BookingStatus),
}

impl BookingBadge {
    pub fn label(&self) -> &'static str {
        match self {
            BookingBadge::Unpaid => "Unpaid",
            BookingBadge::Rejected => "Booking Rejected",
            BookingBadge::Status(status) => status.label(),
        }
    }
}

/// Who has to move next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    BuyerPaysBookingFee,
    AdminVerifiesBookingPayment,
    BuyerResubmitsPayment,
    SellerRecordsFinalPayment,
    SellerRecordsHandover,
    SellerReviewsRefundRequest,
    SellerRefundsBookingFee,
    Nothing,
}

/// Read model returned by the API next to the raw rows.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub stage: Stage,
    pub display_status: DisplayStatus,
    pub display_label: String,
    pub booking_badge: BookingBadge,
    pub booking_label: &'static str,
    pub payment_status: TransactionPaymentStatus,
    pub payment_label: &'static str,
    pub next_action: NextAction,
    pub can_cancel: bool,
    pub can_refund_booking: bool,
    pub open_refund_request: Option<RefundRequest>,
}

impl TransactionView {
    pub fn new(transaction: Transaction, payments: Vec<Payment>) -> Self {
        TransactionView {
            transaction,
            payments,
        }
    }

    fn tx(&self) -> &Transaction {
        &self.transaction
    }

    pub fn payment(&self, payment_id: i64) -> DomainResult<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == payment_id)
            .ok_or(DomainError::NotFound("Payment"))
    }

    /// Newest booking-fee payment.
    pub fn latest_booking_payment(&self) -> Option<&Payment> {
        self.payments
            .iter()
            .filter(|p| p.payment_type == PaymentType::BookingFee)
            .max_by_key(|p| p.id)
    }

    pub fn has_payment_proof(&self) -> bool {
        self.payments.iter().any(Payment::has_proof)
    }

    /// Older rejected attempts stop counting once a newer one exists.
    pub fn has_failed_payment(&self) -> bool {
        self.tx().payment_status == TransactionPaymentStatus::Failed
            || self
                .latest_booking_payment()
                .is_some_and(|p| p.status.is_failure())
            || self
                .payments
                .iter()
                .any(|p| p.payment_type != PaymentType::BookingFee && p.status.is_failure())
    }

    pub fn is_unpaid(&self) -> bool {
        self.tx().payment_status == TransactionPaymentStatus::Pending && !self.has_payment_proof()
    }

    pub fn has_booking_fee_success(&self) -> bool {
        self.payments.iter().any(|p| {
            p.payment_type == PaymentType::BookingFee && p.status == PaymentStatus::Success
        })
    }

    pub fn has_refund(&self) -> bool {
        let tx = self.tx();
        self.payments
            .iter()
            .any(|p| p.status == PaymentStatus::Refunded)
            || tx.status == TransactionStatus::Refunded
            || tx.payment_status == TransactionPaymentStatus::Refunded
            || tx.booking_status == BookingStatus::BookingRefunded
    }

    pub fn needs_booking_verification(&self) -> bool {
        self.tx().booking_status == BookingStatus::BookingPending
            && self.payments.iter().any(|p| {
                p.payment_type == PaymentType::BookingFee && p.status.is_open() && p.has_proof()
            })
    }

    pub fn is_waiting_admin_confirm(&self) -> bool {
        self.tx().status == TransactionStatus::Pending
            && self.has_payment_proof()
            && !self.has_failed_payment()
    }

    pub fn waiting_final_payment(&self) -> bool {
        let tx = self.tx();
        tx.booking_status == BookingStatus::BookingPaid
            && tx.status == TransactionStatus::Confirmed
            && tx.final_payment_completed_at.is_none()
    }

    pub fn waiting_handover(&self) -> bool {
        let tx = self.tx();
        tx.status == TransactionStatus::Completed
            && tx.final_payment_completed_at.is_some()
            && tx.handover_at.is_none()
    }

    pub fn can_cancel(&self) -> bool {
        let tx = self.tx();
        !matches!(
            tx.status,
            TransactionStatus::Completed | TransactionStatus::Cancelled | TransactionStatus::Refunded
        ) && tx.final_payment_completed_at.is_none()
    }

    pub fn can_refund_booking(&self) -> bool {
        let tx = self.tx();
        let refunded_already = tx.booking_status == BookingStatus::BookingRefunded
            || tx.status == TransactionStatus::Refunded;
        self.has_booking_fee_success()
            && !refunded_already
            && tx.final_payment_completed_at.is_none()
            && (matches!(
                tx.status,
                TransactionStatus::Cancelled
                    | TransactionStatus::Pending
                    | TransactionStatus::Confirmed
            ) || tx.booking_status == BookingStatus::BookingCancelled)
    }

    /// Whether this transaction currently keeps the car reserved.
    pub fn holds_car(&self) -> bool {
        matches!(
            self.tx().status,
            TransactionStatus::Pending | TransactionStatus::Confirmed | TransactionStatus::Processing
        )
    }

    pub fn is_booking_expired(&self, now: NaiveDateTime) -> bool {
        let tx = self.tx();
        matches!(
            tx.booking_status,
            BookingStatus::BookingPending | BookingStatus::BookingRejected
        ) && tx.status == TransactionStatus::Pending
            && tx.booking_expires_at.is_some_and(|exp| exp < now)
    }

    pub fn open_refund_request(&self) -> Option<RefundRequest> {
        refund::open_request(self.tx().notes.as_deref())
    }

    pub fn stage(&self) -> Stage {
        let tx = self.tx();
        match (tx.status, tx.booking_status) {
            (TransactionStatus::Refunded, _) | (_, BookingStatus::BookingRefunded) => {
                Stage::Refunded
            }
            (_, BookingStatus::BookingExpired) => Stage::Expired,
            (TransactionStatus::Cancelled, _) | (_, BookingStatus::BookingCancelled) => {
                Stage::Cancelled
            }
            (TransactionStatus::Completed, _) if tx.handover_at.is_some() => Stage::HandedOver,
            (TransactionStatus::Completed, _) => Stage::AwaitingHandover,
            (_, BookingStatus::BookingPaid) => Stage::AwaitingFinalPayment,
            (_, BookingStatus::BookingRejected) => Stage::BookingRejected,
            (_, BookingStatus::BookingPending) => Stage::AwaitingBookingFee,
        }
    }

    pub fn display_status(&self) -> DisplayStatus {
        let tx = self.tx();
        if self.has_failed_payment() {
            return DisplayStatus::Rejected;
        }
        if self.has_refund() {
            return DisplayStatus::Refunded;
        }
        if tx.status == TransactionStatus::Completed && tx.final_payment_completed_at.is_some() {
            return DisplayStatus::Completed;
        }
        if self.has_booking_fee_success() {
            return DisplayStatus::Paid;
        }
        if self.needs_booking_verification() {
            return DisplayStatus::AwaitingVerification;
        }
        if self.is_unpaid() {
            return DisplayStatus::Unpaid;
        }
        if tx.booking_status != BookingStatus::BookingPaid {
            return DisplayStatus::Booking(tx.booking_status);
        }
        DisplayStatus::Transaction(tx.status)
    }

    pub fn booking_badge(&self) -> BookingBadge {
        let status = self.tx().booking_status;
        if status == BookingStatus::BookingPending {
            if self.is_unpaid() {
                return BookingBadge::Unpaid;
            }
            if self.has_failed_payment() {
                return BookingBadge::Rejected;
            }
        }
        BookingBadge::Status(status)
    }

    pub fn display_payment_status(&self) -> TransactionPaymentStatus {
        let tx = self.tx();
        if self.payments.iter().any(|p| p.status == PaymentStatus::Failed) {
            return TransactionPaymentStatus::Failed;
        }
        if tx.status == TransactionStatus::Completed && tx.final_payment_completed_at.is_some() {
            return TransactionPaymentStatus::Paid;
        }
        tx.payment_status
    }

    pub fn payment_label(&self) -> &'static str {
        let status = self.display_payment_status();
        if status == TransactionPaymentStatus::Paid {
            let tx = self.tx();
            if tx.final_payment_completed_at.is_some() || tx.status == TransactionStatus::Completed
            {
                return "Full Paid";
            }
            if self.has_booking_fee_success() || tx.booking_status == BookingStatus::BookingPaid {
                return "Confirmed";
            }
        }
        status.label()
    }

    pub fn next_action(&self) -> NextAction {
        match self.stage() {
            Stage::AwaitingBookingFee if self.needs_booking_verification() => {
                NextAction::AdminVerifiesBookingPayment
            }
            Stage::AwaitingBookingFee => NextAction::BuyerPaysBookingFee,
            Stage::BookingRejected => NextAction::BuyerResubmitsPayment,
            Stage::AwaitingFinalPayment if self.open_refund_request().is_some() => {
                NextAction::SellerReviewsRefundRequest
            }
            Stage::AwaitingFinalPayment => NextAction::SellerRecordsFinalPayment,
            Stage::AwaitingHandover => NextAction::SellerRecordsHandover,
            Stage::Cancelled if self.open_refund_request().is_some() => {
                NextAction::SellerReviewsRefundRequest
            }
            Stage::Cancelled if self.can_refund_booking() => NextAction::SellerRefundsBookingFee,
            _ => NextAction::Nothing,
        }
    }

    pub fn summary(&self) -> TransactionSummary {
        let display_status = self.display_status();
        let booking_badge = self.booking_badge();
        TransactionSummary {
            stage: self.stage(),
            display_status,
            display_label: display_status.label(),
            booking_badge,
            booking_label: booking_badge.label(),
            payment_status: self.display_payment_status(),
            payment_label: self.payment_label(),
            next_action: self.next_action(),
            can_cancel: self.can_cancel(),
            can_refund_booking: self.can_refund_booking(),
            open_refund_request: self.open_refund_request(),
        }
    }
}

fn required(value: &str, what: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DomainError::invalid(format!("{} is required", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Buyer pays (or re-pays after a rejection) the booking fee.
pub fn submit_booking_payment(
    view: &TransactionView,
    actor: &Actor,
    proof: Option<String>,
    bank: BankDetails,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    actor.ensure_buyer(tx)?;
    if tx.status != TransactionStatus::Pending
        || !matches!(
            tx.booking_status,
            BookingStatus::BookingPending | BookingStatus::BookingRejected
        )
    {
        return Err(DomainError::state("Booking is no longer waiting for payment"));
    }
    if view.is_booking_expired(now) {
        return Err(DomainError::state("Booking has expired"));
    }
    if view.has_booking_fee_success() {
        return Err(DomainError::state("Booking fee has already been paid"));
    }
    if view
        .payments
        .iter()
        .any(|p| p.payment_type == PaymentType::BookingFee && p.status.is_open() && p.has_proof())
    {
        return Err(DomainError::state(
            "A booking payment is already waiting for verification",
        ));
    }

    let proof = non_blank(proof);
    let method = non_blank(bank.payment_method).unwrap_or_else(|| "bank_transfer".to_string());
    let mut t = Transition::start(view, now);

    // an unproven pending attempt is superseded by the new one
    for stale in view
        .payments
        .iter()
        .filter(|p| p.payment_type == PaymentType::BookingFee && p.status == PaymentStatus::Pending)
    {
        let mut p = stale.clone();
        p.status = PaymentStatus::Expired;
        p.updated_at = Some(now);
        t.update_payment(p);
    }

    t.new_payment = Some(NewPayment {
        transaction_id: tx.id,
        payment_type: PaymentType::BookingFee,
        amount: tx.booking_fee,
        payment_method: method.clone(),
        reference_code: reference_code("PAY", now),
        bank_name: non_blank(bank.bank_name),
        account_number: non_blank(bank.account_number),
        account_holder: non_blank(bank.account_holder),
        status: if proof.is_some() {
            PaymentStatus::Uploaded
        } else {
            PaymentStatus::Pending
        },
        proof_of_payment: proof,
        verified_by: None,
        verified_at: None,
        notes: None,
        payment_date: now,
    });

    let header = &mut t.transaction;
    header.booking_status = BookingStatus::BookingPending;
    header.payment_status = TransactionPaymentStatus::Pending;
    if header.payment_method.is_none() {
        header.payment_method = Some(method);
    }
    Ok(t)
}

/// Attaches a (new) proof to an existing payment.
pub fn upload_payment_proof(
    view: &TransactionView,
    payment_id: i64,
    actor: &Actor,
    proof: String,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    if !actor.is_admin {
        actor.ensure_buyer(tx)?;
    }
    let proof = required(&proof, "Proof of payment")?;
    let payment = view.payment(payment_id)?;
    if !matches!(
        payment.status,
        PaymentStatus::Pending | PaymentStatus::Uploaded | PaymentStatus::Rejected
    ) {
        return Err(DomainError::state(
            "Proof can only be attached to a pending or rejected payment",
        ));
    }

    let mut t = Transition::start(view, now);
    if payment.payment_type == PaymentType::BookingFee {
        if !matches!(
            tx.booking_status,
            BookingStatus::BookingPending | BookingStatus::BookingRejected
        ) || tx.status != TransactionStatus::Pending
        {
            return Err(DomainError::state("Booking is no longer waiting for payment"));
        }
        if view.is_booking_expired(now) {
            return Err(DomainError::state("Booking has expired"));
        }
        t.transaction.booking_status = BookingStatus::BookingPending;
        t.transaction.payment_status = TransactionPaymentStatus::Pending;
    }

    let mut p = payment.clone();
    p.proof_of_payment = Some(proof);
    p.status = PaymentStatus::Uploaded;
    p.updated_at = Some(now);
    t.update_payment(p);
    Ok(t)
}

/// Admin accepts the booking-fee transfer.
pub fn confirm_booking_payment(
    view: &TransactionView,
    payment_id: i64,
    actor: &Actor,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    actor.ensure_admin()?;
    let tx = view.tx();
    let payment = view.payment(payment_id)?;
    if payment.payment_type != PaymentType::BookingFee {
        return Err(DomainError::state("Payment is not a booking fee"));
    }
    if !payment.status.is_open() {
        return Err(DomainError::state("Payment is not waiting for verification"));
    }
    if !payment.has_proof() {
        return Err(DomainError::state("Payment has no proof attached"));
    }
    if tx.booking_status != BookingStatus::BookingPending || tx.status != TransactionStatus::Pending
    {
        return Err(DomainError::state("Booking is not waiting for confirmation"));
    }

    let mut t = Transition::start(view, now);
    let mut p = payment.clone();
    p.status = PaymentStatus::Success;
    p.verified_by = Some(actor.user_id);
    p.verified_at = Some(now);
    p.updated_at = Some(now);
    t.update_payment(p);

    let header = &mut t.transaction;
    header.booking_status = BookingStatus::BookingPaid;
    header.status = TransactionStatus::Confirmed;
    header.payment_status = TransactionPaymentStatus::Partial;
    header.confirmed_at = Some(now);
    Ok(t)
}

/// Admin rejects a transfer that is waiting for verification.
pub fn reject_payment(
    view: &TransactionView,
    payment_id: i64,
    actor: &Actor,
    reason: Option<String>,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    actor.ensure_admin()?;
    let payment = view.payment(payment_id)?;
    if !payment.status.is_open() {
        return Err(DomainError::state("Payment is not waiting for verification"));
    }

    let mut t = Transition::start(view, now);
    let mut p = payment.clone();
    p.status = PaymentStatus::Rejected;
    p.rejection_reason =
        Some(non_blank(reason).unwrap_or_else(|| "Payment rejected by admin".to_string()));
    p.rejected_by = Some(actor.user_id);
    p.rejected_at = Some(now);
    p.verified_by = Some(actor.user_id);
    p.verified_at = Some(now);
    p.rejection_count += 1;
    p.updated_at = Some(now);
    let is_booking_fee = p.payment_type == PaymentType::BookingFee;
    t.update_payment(p);

    if is_booking_fee && view.tx().booking_status == BookingStatus::BookingPending {
        let header = &mut t.transaction;
        header.booking_status = BookingStatus::BookingRejected;
        header.payment_status = TransactionPaymentStatus::Failed;
        header.booking_rejected_at = Some(now);
    }
    Ok(t)
}

/// Seller (or admin) records the remaining amount as paid, in cash or by a
/// credit partner. The car is sold from here on.
pub fn record_final_payment(
    view: &TransactionView,
    actor: &Actor,
    method: FinalPaymentMethod,
    proof: Option<String>,
    notes: Option<String>,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    actor.ensure_seller_or_admin(tx)?;
    if !view.waiting_final_payment() {
        return Err(DomainError::state(
            "Final payment can only be recorded after the booking fee is confirmed",
        ));
    }

    let mut t = Transition::start(view, now);
    let remaining = tx.total_amount - tx.booking_fee;
    if remaining > 0 {
        let (payment_type, payment_method) = match method {
            FinalPaymentMethod::Full => (PaymentType::FullPayment, "transfer"),
            FinalPaymentMethod::Credit => (PaymentType::DownPayment, "credit"),
        };
        t.new_payment = Some(NewPayment {
            transaction_id: tx.id,
            payment_type,
            amount: remaining,
            payment_method: payment_method.to_string(),
            reference_code: reference_code("PAY", now),
            bank_name: None,
            account_number: None,
            account_holder: None,
            status: PaymentStatus::Success,
            proof_of_payment: non_blank(proof),
            verified_by: Some(actor.user_id),
            verified_at: Some(now),
            notes: non_blank(notes),
            payment_date: now,
        });
    }

    let header = &mut t.transaction;
    header.status = TransactionStatus::Completed;
    header.payment_status = TransactionPaymentStatus::Paid;
    header.final_payment_method = Some(method);
    header.final_payment_completed_at = Some(now);
    t.car_change = Some(CarChange {
        car_id: tx.car_id,
        from: CarStatus::Reserved,
        to: CarStatus::Sold,
    });
    Ok(t)
}

pub fn record_handover(
    view: &TransactionView,
    actor: &Actor,
    photo: Option<String>,
    notes: Option<String>,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    actor.ensure_seller_or_admin(view.tx())?;
    if !view.waiting_handover() {
        return Err(DomainError::state(
            "Handover requires a completed transaction without a previous handover",
        ));
    }
    let mut t = Transition::start(view, now);
    let header = &mut t.transaction;
    header.handover_at = Some(now);
    header.handover_photo = non_blank(photo);
    header.handover_notes = non_blank(notes);
    Ok(t)
}

pub fn cancel_transaction(
    view: &TransactionView,
    actor: &Actor,
    reason: &str,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    actor.ensure_party_or_admin(view.tx())?;
    let reason = required(reason, "Cancellation reason")?;
    if !view.can_cancel() {
        return Err(DomainError::state("Transaction can no longer be cancelled"));
    }
    let mut t = Transition::start(view, now);
    t.expire_open_payments(view, now);
    t.release_car(view);
    let header = &mut t.transaction;
    header.status = TransactionStatus::Cancelled;
    header.booking_status = BookingStatus::BookingCancelled;
    header.cancelled_at = Some(now);
    header.cancellation_reason = Some(reason);
    Ok(t)
}

/// Booking hold ran out before the fee was confirmed.
pub fn expire_booking(view: &TransactionView, now: NaiveDateTime) -> DomainResult<Transition> {
    if !view.is_booking_expired(now) {
        return Err(DomainError::state("Booking has not expired"));
    }
    let mut t = Transition::start(view, now);
    t.expire_open_payments(view, now);
    t.release_car(view);
    let header = &mut t.transaction;
    header.status = TransactionStatus::Cancelled;
    header.booking_status = BookingStatus::BookingExpired;
    header.cancelled_at = Some(now);
    header.cancellation_reason = Some("Booking expired".to_string());
    Ok(t)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequestInput {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub reason: String,
}

/// Buyer asks for the booking fee back.
pub fn request_refund(
    view: &TransactionView,
    actor: &Actor,
    input: RefundRequestInput,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    actor.ensure_buyer(tx)?;
    if !view.can_refund_booking() {
        return Err(DomainError::state("Booking fee is not refundable"));
    }
    if view.open_refund_request().is_some() {
        return Err(DomainError::state("A refund request is already open"));
    }
    let request = RefundRequest {
        bank_name: required(&input.bank_name, "Bank name")?,
        account_number: required(&input.account_number, "Account number")?,
        account_holder: required(&input.account_holder, "Account holder")?,
        reason: required(&input.reason, "Reason")?,
        requested_by: Some(actor.user_id),
        requested_at: Some(now),
    };
    let mut t = Transition::start(view, now);
    t.transaction.notes = Some(refund::append_tag(tx.notes.as_deref(), &request.to_tag()));
    Ok(t)
}

pub fn reject_refund_request(
    view: &TransactionView,
    actor: &Actor,
    reason: &str,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    actor.ensure_seller_or_admin(tx)?;
    let reason = required(reason, "Reason")?;
    if view.open_refund_request().is_none() {
        return Err(DomainError::state("There is no open refund request"));
    }
    let rejection = RefundRejection {
        reason,
        rejected_by: Some(actor.user_id),
        rejected_at: Some(now),
    };
    let mut t = Transition::start(view, now);
    t.transaction.notes = Some(refund::append_tag(tx.notes.as_deref(), &rejection.to_tag()));
    Ok(t)
}

/// Returns the whole booking fee to the buyer.
pub fn refund_booking_fee(
    view: &TransactionView,
    actor: &Actor,
    amount: i64,
    reason: &str,
    proof: Option<String>,
    now: NaiveDateTime,
) -> DomainResult<Transition> {
    let tx = view.tx();
    actor.ensure_seller_or_admin(tx)?;
    let reason = required(reason, "Refund reason")?;
    if tx.booking_fee <= 0 {
        return Err(DomainError::invalid("Booking fee is not valid"));
    }
    if amount != tx.booking_fee {
        return Err(DomainError::invalid(format!(
            "Refund amount must equal the booking fee ({})",
            tx.booking_fee
        )));
    }
    if !view.can_refund_booking() {
        return Err(DomainError::state("Booking fee is not refundable"));
    }

    let mut t = Transition::start(view, now);
    t.expire_open_payments(view, now);
    for paid in view.payments.iter().filter(|p| {
        p.payment_type == PaymentType::BookingFee && p.status == PaymentStatus::Success
    }) {
        let mut p = paid.clone();
        p.status = PaymentStatus::Refunded;
        p.updated_at = Some(now);
        t.update_payment(p);
    }
    t.release_car(view);

    let header = &mut t.transaction;
    header.status = TransactionStatus::Refunded;
    header.booking_status = BookingStatus::BookingRefunded;
    header.payment_status = TransactionPaymentStatus::Refunded;
    header.refunded_at = Some(now);
    header.refund_amount = Some(amount);
    header.refund_proof = non_blank(proof);
    if header.cancelled_at.is_none() {
        header.cancelled_at = Some(now);
    }
    if header.cancellation_reason.is_none() {
        header.cancellation_reason = Some(reason);
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    const BUYER: Actor = Actor {
        user_id: 10,
        is_admin: false,
    };
    const SELLER: Actor = Actor {
        user_id: 20,
        is_admin: false,
    };
    const ADMIN: Actor = Actor {
        user_id: 1,
        is_admin: true,
    };
    const STRANGER: Actor = Actor {
        user_id: 99,
        is_admin: false,
    };

    fn car(status: CarStatus) -> Car {
        Car {
            id: 5,
            seller_id: SELLER.user_id,
            brand: "Toyota".into(),
            model: "Avanza".into(),
            year: 2021,
            price: 200_000_000,
            mileage: 30_000,
            transmission: None,
            fuel_type: None,
            color: None,
            location: None,
            description: None,
            status,
            package_id: None,
            listing_start_date: None,
            listing_end_date: None,
            refresh_count: 0,
            last_refreshed_at: None,
            view_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Materialises a transition the way the database would.
    fn apply(view: &TransactionView, t: Transition) -> TransactionView {
        let mut payments = view.payments.clone();
        for updated in t.payment_updates {
            if let Some(slot) = payments.iter_mut().find(|p| p.id == updated.id) {
                *slot = updated;
            }
        }
        if let Some(new) = t.new_payment {
            let id = payments.iter().map(|p| p.id).max().unwrap_or(0) + 1;
            payments.push(Payment {
                id,
                transaction_id: new.transaction_id,
                payment_type: new.payment_type,
                amount: new.amount,
                payment_method: new.payment_method,
                reference_code: new.reference_code,
                bank_name: new.bank_name,
                account_number: new.account_number,
                account_holder: new.account_holder,
                status: new.status,
                proof_of_payment: new.proof_of_payment,
                verified_by: new.verified_by,
                verified_at: new.verified_at,
                rejection_reason: None,
                rejected_by: None,
                rejected_at: None,
                rejection_count: 0,
                notes: new.notes,
                payment_date: new.payment_date,
                created_at: Some(new.payment_date),
                updated_at: None,
            });
        }
        let mut transaction = t.transaction;
        transaction.version += 1;
        TransactionView::new(transaction, payments)
    }

    fn booked() -> TransactionView {
        let new = new_booking(
            &BUYER,
            &car(CarStatus::Available),
            &BookingPolicy::default(),
            None,
            None,
            now(),
        )
        .unwrap();
        let transaction = Transaction {
            id: 1,
            invoice_number: new.invoice_number,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            car_id: new.car_id,
            car_price: new.car_price,
            booking_fee: new.booking_fee,
            total_amount: new.total_amount,
            payment_method: new.payment_method,
            payment_status: TransactionPaymentStatus::Pending,
            status: TransactionStatus::Pending,
            booking_status: BookingStatus::BookingPending,
            booking_expires_at: Some(new.booking_expires_at),
            confirmed_at: None,
            booking_rejected_at: None,
            final_payment_method: None,
            final_payment_completed_at: None,
            handover_at: None,
            handover_photo: None,
            handover_notes: None,
            cancelled_at: None,
            cancellation_reason: None,
            refunded_at: None,
            refund_amount: None,
            refund_proof: None,
            notes: new.notes,
            version: 0,
            created_at: Some(now()),
            updated_at: Some(now()),
        };
        TransactionView::new(transaction, Vec::new())
    }

    fn with_proof(view: &TransactionView) -> TransactionView {
        let t = submit_booking_payment(
            view,
            &BUYER,
            Some("payment-proofs/a.jpg".into()),
            BankDetails::default(),
            now(),
        )
        .unwrap();
        apply(view, t)
    }

    fn confirmed() -> TransactionView {
        let v = with_proof(&booked());
        let pid = v.latest_booking_payment().unwrap().id;
        apply(&v, confirm_booking_payment(&v, pid, &ADMIN, now()).unwrap())
    }

    fn completed() -> TransactionView {
        let v = confirmed();
        let t = record_final_payment(&v, &SELLER, FinalPaymentMethod::Full, None, None, now())
            .unwrap();
        apply(&v, t)
    }

    #[test]
    fn booking_fee_rounds_up() {
        assert_eq!(booking_fee(200_000_000, 5.0), 10_000_000);
        assert_eq!(booking_fee(1_001, 5.0), 51);
        assert_eq!(booking_fee(10, 0.0), 1);
        assert_eq!(booking_fee(10, 500.0), 10);
    }

    #[test]
    fn new_booking_requires_available_car_and_other_party() {
        let policy = BookingPolicy::default();
        let err = new_booking(&BUYER, &car(CarStatus::Reserved), &policy, None, None, now());
        assert!(matches!(err, Err(DomainError::InvalidState(_))));
        let err = new_booking(&SELLER, &car(CarStatus::Available), &policy, None, None, now());
        assert!(matches!(err, Err(DomainError::Forbidden(_))));

        let ok = new_booking(&BUYER, &car(CarStatus::Available), &policy, None, None, now())
            .unwrap();
        assert_eq!(ok.booking_expires_at, now() + Duration::hours(24));
        assert_eq!(ok.total_amount, 200_000_000);
        assert!(ok.invoice_number.starts_with("INV-20250520-"));
    }

    #[test]
    fn fresh_booking_is_unpaid() {
        let v = booked();
        assert_eq!(v.stage(), Stage::AwaitingBookingFee);
        assert_eq!(v.display_status(), DisplayStatus::Unpaid);
        assert_eq!(v.booking_badge(), BookingBadge::Unpaid);
        assert_eq!(v.next_action(), NextAction::BuyerPaysBookingFee);
        assert!(v.can_cancel());
        assert!(!v.can_refund_booking());
    }

    #[test]
    fn proof_moves_booking_to_verification() {
        let v = with_proof(&booked());
        let payment = v.latest_booking_payment().unwrap();
        assert_eq!(payment.status, PaymentStatus::Uploaded);
        assert_eq!(payment.amount, 10_000_000);
        assert!(v.needs_booking_verification());
        assert!(v.is_waiting_admin_confirm());
        assert_eq!(v.display_status(), DisplayStatus::AwaitingVerification);
        assert_eq!(v.next_action(), NextAction::AdminVerifiesBookingPayment);

        let again = submit_booking_payment(&v, &BUYER, None, BankDetails::default(), now());
        assert!(matches!(again, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn only_buyer_pays_booking_fee() {
        let v = booked();
        let err = submit_booking_payment(&v, &SELLER, None, BankDetails::default(), now());
        assert!(matches!(err, Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn payment_without_proof_stays_pending_until_upload() {
        let v = booked();
        let v = apply(
            &v,
            submit_booking_payment(&v, &BUYER, None, BankDetails::default(), now()).unwrap(),
        );
        let pid = v.latest_booking_payment().unwrap().id;
        assert_eq!(v.latest_booking_payment().unwrap().status, PaymentStatus::Pending);
        assert!(confirm_booking_payment(&v, pid, &ADMIN, now()).is_err());

        let v = apply(
            &v,
            upload_payment_proof(&v, pid, &BUYER, "payment-proofs/b.png".into(), now()).unwrap(),
        );
        assert!(v.needs_booking_verification());
    }

    #[test]
    fn confirmation_marks_booking_paid() {
        let v = confirmed();
        let tx = &v.transaction;
        assert_eq!(tx.booking_status, BookingStatus::BookingPaid);
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert_eq!(tx.payment_status, TransactionPaymentStatus::Partial);
        assert_eq!(tx.confirmed_at, Some(now()));
        assert_eq!(v.stage(), Stage::AwaitingFinalPayment);
        assert_eq!(v.display_status(), DisplayStatus::Paid);
        assert!(v.waiting_final_payment());
        assert_eq!(v.payment_label(), "Partial");
        assert_eq!(v.next_action(), NextAction::SellerRecordsFinalPayment);
    }

    #[test]
    fn only_admin_confirms() {
        let v = with_proof(&booked());
        let pid = v.latest_booking_payment().unwrap().id;
        let err = confirm_booking_payment(&v, pid, &SELLER, now());
        assert!(matches!(err, Err(DomainError::Forbidden(_))));
        let err = confirm_booking_payment(&v, 404, &ADMIN, now());
        assert_eq!(err.unwrap_err(), DomainError::NotFound("Payment"));
    }

    #[test]
    fn rejection_and_resubmission() {
        let v = with_proof(&booked());
        let pid = v.latest_booking_payment().unwrap().id;
        let v = apply(&v, reject_payment(&v, pid, &ADMIN, None, now()).unwrap());

        let rejected = v.payment(pid).unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert_eq!(rejected.rejection_count, 1);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("Payment rejected by admin")
        );
        assert_eq!(v.transaction.booking_status, BookingStatus::BookingRejected);
        assert_eq!(v.stage(), Stage::BookingRejected);
        assert_eq!(v.display_status(), DisplayStatus::Rejected);
        assert_eq!(v.next_action(), NextAction::BuyerResubmitsPayment);

        // a fresh attempt clears the rejected display
        let v = with_proof(&v);
        assert_eq!(v.transaction.booking_status, BookingStatus::BookingPending);
        assert!(!v.has_failed_payment());
        assert_eq!(v.display_status(), DisplayStatus::AwaitingVerification);
    }

    #[test]
    fn reupload_on_rejected_payment_keeps_count() {
        let v = with_proof(&booked());
        let pid = v.latest_booking_payment().unwrap().id;
        let v = apply(
            &v,
            reject_payment(&v, pid, &ADMIN, Some("blurry".into()), now()).unwrap(),
        );
        let v = apply(
            &v,
            upload_payment_proof(&v, pid, &BUYER, "payment-proofs/c.jpg".into(), now()).unwrap(),
        );
        let p = v.payment(pid).unwrap();
        assert_eq!(p.status, PaymentStatus::Uploaded);
        assert_eq!(p.rejection_count, 1);
        assert_eq!(v.transaction.booking_status, BookingStatus::BookingPending);

        let v = apply(&v, reject_payment(&v, pid, &ADMIN, None, now()).unwrap());
        assert_eq!(v.payment(pid).unwrap().rejection_count, 2);
    }

    #[test]
    fn final_payment_completes_and_sells_car() {
        let v = confirmed();
        let err = record_final_payment(&v, &BUYER, FinalPaymentMethod::Full, None, None, now());
        assert!(matches!(err, Err(DomainError::Forbidden(_))));

        let t = record_final_payment(
            &v,
            &SELLER,
            FinalPaymentMethod::Credit,
            None,
            Some("Leasing BCA".into()),
            now(),
        )
        .unwrap();
        assert_eq!(
            t.car_change,
            Some(CarChange {
                car_id: 5,
                from: CarStatus::Reserved,
                to: CarStatus::Sold
            })
        );
        let new = t.new_payment.as_ref().unwrap();
        assert_eq!(new.payment_type, PaymentType::DownPayment);
        assert_eq!(new.amount, 190_000_000);
        assert_eq!(new.status, PaymentStatus::Success);

        let v = apply(&v, t);
        assert_eq!(v.stage(), Stage::AwaitingHandover);
        assert_eq!(v.display_status(), DisplayStatus::Completed);
        assert_eq!(v.payment_label(), "Full Paid");
        assert!(v.waiting_handover());
        assert!(!v.can_cancel());
        assert!(!v.can_refund_booking());
    }

    #[test]
    fn final_payment_needs_confirmed_booking() {
        let v = with_proof(&booked());
        let err = record_final_payment(&v, &ADMIN, FinalPaymentMethod::Full, None, None, now());
        assert!(matches!(err, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn handover_once() {
        let v = completed();
        let v = apply(
            &v,
            record_handover(&v, &SELLER, Some("handover-photos/k.jpg".into()), None, now())
                .unwrap(),
        );
        assert_eq!(v.stage(), Stage::HandedOver);
        assert_eq!(v.next_action(), NextAction::Nothing);
        assert!(record_handover(&v, &SELLER, None, None, now()).is_err());
    }

    #[test]
    fn cancel_releases_car_and_expires_open_payments() {
        let v = with_proof(&booked());
        assert!(matches!(
            cancel_transaction(&v, &BUYER, "  ", now()),
            Err(DomainError::Invalid(_))
        ));
        assert!(matches!(
            cancel_transaction(&v, &STRANGER, "no", now()),
            Err(DomainError::Forbidden(_))
        ));

        let t = cancel_transaction(&v, &BUYER, "Changed my mind", now()).unwrap();
        assert_eq!(
            t.car_change,
            Some(CarChange {
                car_id: 5,
                from: CarStatus::Reserved,
                to: CarStatus::Available
            })
        );
        assert_eq!(t.payment_updates.len(), 1);
        assert_eq!(t.payment_updates[0].status, PaymentStatus::Expired);

        let v = apply(&v, t);
        assert_eq!(v.stage(), Stage::Cancelled);
        assert_eq!(v.transaction.booking_status, BookingStatus::BookingCancelled);
        assert!(!v.can_cancel());
        assert!(cancel_transaction(&v, &BUYER, "again", now()).is_err());
    }

    #[test]
    fn expiry_only_after_deadline() {
        let v = booked();
        assert!(expire_booking(&v, now()).is_err());
        let later = now() + Duration::hours(25);
        assert!(v.is_booking_expired(later));

        let v = apply(&v, expire_booking(&v, later).unwrap());
        assert_eq!(v.transaction.booking_status, BookingStatus::BookingExpired);
        assert_eq!(v.transaction.status, TransactionStatus::Cancelled);
        assert_eq!(v.stage(), Stage::Expired);

        let err = submit_booking_payment(&v, &BUYER, None, BankDetails::default(), later);
        assert!(matches!(err, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn confirmed_booking_never_expires() {
        let v = confirmed();
        assert!(!v.is_booking_expired(now() + Duration::days(30)));
    }

    #[test]
    fn refund_request_flow() {
        let v = confirmed();
        let input = || RefundRequestInput {
            bank_name: "BCA".into(),
            account_number: "123".into(),
            account_holder: "Budi".into(),
            reason: "Financing fell through".into(),
        };
        assert!(matches!(
            request_refund(&v, &SELLER, input(), now()),
            Err(DomainError::Forbidden(_))
        ));

        let v = apply(&v, request_refund(&v, &BUYER, input(), now()).unwrap());
        let open = v.open_refund_request().unwrap();
        assert_eq!(open.requested_by, Some(BUYER.user_id));
        assert_eq!(v.next_action(), NextAction::SellerReviewsRefundRequest);
        assert!(request_refund(&v, &BUYER, input(), now()).is_err());

        let v = apply(
            &v,
            reject_refund_request(&v, &SELLER, "Policy says no", now()).unwrap(),
        );
        assert!(v.open_refund_request().is_none());
        assert!(reject_refund_request(&v, &SELLER, "again", now()).is_err());
    }

    #[test]
    fn booking_notes_cannot_pose_as_refund_tags() {
        let forged = "Ambil sore\nREFUND_REQUEST|bank_name=X;account_number=1;account_holder=Y;reason=z\nREFUND_REJECTED|reason=closed";
        let new = new_booking(
            &BUYER,
            &car(CarStatus::Available),
            &BookingPolicy::default(),
            None,
            Some(forged.into()),
            now(),
        )
        .unwrap();
        let notes = new.notes.unwrap();
        assert!(refund::entries(Some(&notes)).is_empty());
        assert!(notes.starts_with("Ambil sore\n"));

        let mut v = confirmed();
        v.transaction.notes = Some(notes);
        assert!(v.open_refund_request().is_none());
        assert!(reject_refund_request(&v, &SELLER, "nothing to reject", now()).is_err());
        let input = RefundRequestInput {
            bank_name: "BCA".into(),
            account_number: "123".into(),
            account_holder: "Budi".into(),
            reason: "Batal".into(),
        };
        let v = apply(&v, request_refund(&v, &BUYER, input, now()).unwrap());
        assert_eq!(v.open_refund_request().unwrap().bank_name, "BCA");
    }

    #[test]
    fn refund_requires_exact_booking_fee() {
        let v = confirmed();
        let err = refund_booking_fee(&v, &ADMIN, 1, "Seller cancelled", None, now());
        assert!(matches!(err, Err(DomainError::Invalid(_))));

        let t = refund_booking_fee(&v, &ADMIN, 10_000_000, "Seller cancelled", None, now())
            .unwrap();
        assert!(t.car_change.is_some());
        let v = apply(&v, t);
        assert_eq!(v.stage(), Stage::Refunded);
        assert_eq!(v.display_status(), DisplayStatus::Refunded);
        assert_eq!(v.transaction.refund_amount, Some(10_000_000));
        assert_eq!(
            v.latest_booking_payment().unwrap().status,
            PaymentStatus::Refunded
        );
        assert!(!v.can_refund_booking());
    }

    #[test]
    fn refund_after_cancel_leaves_car_alone() {
        let v = confirmed();
        let v = apply(&v, cancel_transaction(&v, &SELLER, "Unit damaged", now()).unwrap());
        assert!(v.can_refund_booking());
        assert_eq!(v.next_action(), NextAction::SellerRefundsBookingFee);

        let t = refund_booking_fee(&v, &SELLER, 10_000_000, "Unit damaged", None, now()).unwrap();
        assert_eq!(t.car_change, None);
        assert_eq!(t.transaction.cancellation_reason.as_deref(), Some("Unit damaged"));
    }

    #[test]
    fn unpaid_booking_cannot_be_refunded() {
        let v = booked();
        assert!(matches!(
            refund_booking_fee(&v, &ADMIN, 10_000_000, "x", None, now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn booking_display_falls_back_to_status() {
        let mut v = booked();
        v.payments.push(Payment {
            id: 1,
            transaction_id: 1,
            payment_type: PaymentType::BookingFee,
            amount: 1,
            payment_method: "bank_transfer".into(),
            reference_code: "PAY-1".into(),
            bank_name: None,
            account_number: None,
            account_holder: None,
            status: PaymentStatus::Expired,
            proof_of_payment: Some("payment-proofs/x.jpg".into()),
            verified_by: None,
            verified_at: None,
            rejection_reason: None,
            rejected_by: None,
            rejected_at: None,
            rejection_count: 0,
            notes: None,
            payment_date: now(),
            created_at: None,
            updated_at: None,
        });
        assert_eq!(
            v.display_status(),
            DisplayStatus::Booking(BookingStatus::BookingPending)
        );
        assert_eq!(v.display_status().label(), "pending");
        assert_eq!(
            v.booking_badge(),
            BookingBadge::Status(BookingStatus::BookingPending)
        );
    }

    #[test]
    fn summary_reflects_view() {
        let s = confirmed().summary();
        assert_eq!(s.stage, Stage::AwaitingFinalPayment);
        assert_eq!(s.display_label, "Paid");
        assert_eq!(s.booking_label, "Booking Paid");
        assert!(s.can_cancel);
        assert!(s.can_refund_booking);
        assert!(s.open_refund_request.is_none());
    }
}
