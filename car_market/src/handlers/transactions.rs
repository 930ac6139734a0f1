use actix_web::{Error, HttpResponse, get, post, web};
use chrono::Utc;
use common::workflow::{
    self, Actor, RefundRequestInput, TransactionSummary, TransactionView,
};
use common::{
    AuthUser, BankDetails, DomainError, FinalPaymentMethod, Paged, Payment, Transaction,
    TransactionFilter,
};
use serde::{Deserialize, Serialize};

use crate::handlers::{PageQuery, failure, not_found, uploaded};
use crate::state::AppState;
use crate::storage::Bucket;

/// A transaction as returned to clients: rows plus the derived status.
#[derive(Debug, Serialize)]
pub struct TransactionDetail {
    pub transaction: Transaction,
    pub payments: Vec<Payment>,
    pub summary: TransactionSummary,
}

impl From<TransactionView> for TransactionDetail {
    fn from(view: TransactionView) -> Self {
        let summary = view.summary();
        TransactionDetail {
            transaction: view.transaction,
            payments: view.payments,
            summary,
        }
    }
}

fn details(page: Paged<TransactionView>) -> Paged<TransactionDetail> {
    Paged {
        items: page.items.into_iter().map(TransactionDetail::from).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }
}

#[derive(Debug, Deserialize)]
pub struct BookingData {
    pub car_id: i64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[post("/transactions")]
pub async fn book_car(
    data: web::Json<BookingData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let car = app_state
        .db
        .get_car(data.car_id)
        .await
        .map_err(|e| failure(e, "Failed to book car"))?
        .ok_or_else(|| not_found("Car"))?;

    let booking = workflow::new_booking(
        &Actor::from(&user),
        &car,
        &app_state.policy,
        data.payment_method,
        data.notes,
        Utc::now().naive_utc(),
    )
    .map_err(|e| failure(e.into(), "Booking rejected"))?;

    let view = app_state
        .db
        .insert_booking(&booking)
        .await
        .map_err(|e| failure(e, "Failed to book car"))?;
    log::info!(
        "User {} booked car {} with invoice {}",
        user.username,
        car.id,
        view.transaction.invoice_number
    );
    Ok(HttpResponse::Created().json(TransactionDetail::from(view)))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Role {
    #[default]
    Buyer,
    Seller,
}

#[derive(Debug, Deserialize)]
struct MyTransactionsQuery {
    #[serde(default)]
    role: Role,
}

#[get("/my/transactions")]
pub async fn my_transactions(
    query: web::Query<MyTransactionsQuery>,
    filter: web::Query<TransactionFilter>,
    paging: web::Query<PageQuery>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut filter = filter.into_inner();
    match query.role {
        Role::Buyer => {
            filter.buyer_id = Some(user.id);
            filter.seller_id = None;
        }
        Role::Seller => {
            filter.seller_id = Some(user.id);
            filter.buyer_id = None;
        }
    }
    let page = app_state
        .db
        .list_transactions(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to get transactions"))?;
    Ok(HttpResponse::Ok().json(details(page)))
}

#[get("/transactions/{id}")]
pub async fn get_transaction(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let view = app_state
        .db
        .get_transaction_view(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to get transaction"))?
        .ok_or_else(|| not_found("Transaction"))?;
    if !user.is_superuser && !view.transaction.is_party(user.id) {
        return Err(failure(
            DomainError::forbidden("You are not part of this transaction").into(),
            "Transaction hidden",
        ));
    }
    Ok(HttpResponse::Ok().json(TransactionDetail::from(view)))
}

/// Runs one workflow step on a transaction and answers with the result.
async fn transition<F>(
    app_state: &AppState,
    id: i64,
    what: &str,
    step: F,
) -> Result<HttpResponse, Error>
where
    F: FnOnce(&TransactionView) -> common::DomainResult<workflow::Transition>,
{
    let view = app_state
        .db
        .run_transition(id, step)
        .await
        .map_err(|e| failure(e, what))?;
    log::info!(
        "{}: {} is now {:?}",
        what,
        view.transaction.invoice_number,
        view.stage()
    );
    Ok(HttpResponse::Ok().json(TransactionDetail::from(view)))
}

#[derive(Debug, Deserialize)]
pub struct BookingPaymentData {
    #[serde(default)]
    pub proof: Option<String>,
    #[serde(flatten)]
    pub bank: BankDetails,
}

#[post("/transactions/{id}/booking-payment")]
pub async fn submit_booking_payment(
    path: web::Path<i64>,
    data: web::Json<BookingPaymentData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let data = data.into_inner();
    let proof = uploaded(&app_state, Bucket::PaymentProofs, data.proof).await?;
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Booking payment", |view| {
        workflow::submit_booking_payment(view, &actor, proof, data.bank, now)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct PaymentProofData {
    pub proof: String,
}

#[post("/transactions/{id}/payments/{payment_id}/proof")]
pub async fn upload_payment_proof(
    path: web::Path<(i64, i64)>,
    data: web::Json<PaymentProofData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (id, payment_id) = path.into_inner();
    let actor = Actor::from(&user);
    let proof = uploaded(&app_state, Bucket::PaymentProofs, Some(data.into_inner().proof))
        .await?
        .unwrap_or_default();
    let now = Utc::now().naive_utc();
    transition(&app_state, id, "Payment proof", |view| {
        workflow::upload_payment_proof(view, payment_id, &actor, proof, now)
    })
    .await
}

#[post("/transactions/{id}/payments/{payment_id}/confirm")]
pub async fn confirm_booking_payment(
    path: web::Path<(i64, i64)>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (id, payment_id) = path.into_inner();
    let actor = Actor::from(&user);
    let now = Utc::now().naive_utc();
    transition(&app_state, id, "Booking confirmation", |view| {
        workflow::confirm_booking_payment(view, payment_id, &actor, now)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectPaymentData {
    #[serde(default)]
    pub reason: Option<String>,
}

#[post("/transactions/{id}/payments/{payment_id}/reject")]
pub async fn reject_payment(
    path: web::Path<(i64, i64)>,
    data: Option<web::Json<RejectPaymentData>>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (id, payment_id) = path.into_inner();
    let actor = Actor::from(&user);
    let reason = data.and_then(|d| d.into_inner().reason);
    let now = Utc::now().naive_utc();
    transition(&app_state, id, "Payment rejection", |view| {
        workflow::reject_payment(view, payment_id, &actor, reason, now)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct FinalPaymentData {
    pub method: FinalPaymentMethod,
    #[serde(default)]
    pub proof: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[post("/transactions/{id}/final-payment")]
pub async fn record_final_payment(
    path: web::Path<i64>,
    data: web::Json<FinalPaymentData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let data = data.into_inner();
    let proof = uploaded(&app_state, Bucket::PaymentProofs, data.proof).await?;
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Final payment", |view| {
        workflow::record_final_payment(view, &actor, data.method, proof, data.notes, now)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct HandoverData {
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[post("/transactions/{id}/handover")]
pub async fn record_handover(
    path: web::Path<i64>,
    data: web::Json<HandoverData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let data = data.into_inner();
    let photo = uploaded(&app_state, Bucket::HandoverPhotos, data.photo).await?;
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Handover", |view| {
        workflow::record_handover(view, &actor, photo, data.notes, now)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct ReasonData {
    pub reason: String,
}

#[post("/transactions/{id}/cancel")]
pub async fn cancel_transaction(
    path: web::Path<i64>,
    data: web::Json<ReasonData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Cancellation", |view| {
        workflow::cancel_transaction(view, &actor, &data.reason, now)
    })
    .await
}

#[post("/transactions/{id}/refund-request")]
pub async fn request_refund(
    path: web::Path<i64>,
    data: web::Json<RefundRequestInput>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let input = data.into_inner();
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Refund request", |view| {
        workflow::request_refund(view, &actor, input, now)
    })
    .await
}

#[post("/transactions/{id}/refund-request/reject")]
pub async fn reject_refund_request(
    path: web::Path<i64>,
    data: web::Json<ReasonData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Refund request rejection", |view| {
        workflow::reject_refund_request(view, &actor, &data.reason, now)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct RefundData {
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub proof: Option<String>,
}

#[post("/transactions/{id}/refund")]
pub async fn refund_booking_fee(
    path: web::Path<i64>,
    data: web::Json<RefundData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = Actor::from(&user);
    let data = data.into_inner();
    let proof = uploaded(&app_state, Bucket::PaymentProofs, data.proof).await?;
    let now = Utc::now().naive_utc();
    transition(&app_state, path.into_inner(), "Refund", |view| {
        workflow::refund_booking_fee(view, &actor, data.amount, &data.reason, proof, now)
    })
    .await
}

#[get("/transactions")]
pub async fn admin_transactions(
    filter: web::Query<TransactionFilter>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let page = app_state
        .db
        .list_transactions(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to get transactions"))?;
    Ok(HttpResponse::Ok().json(details(page)))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use common::CarStatus;
    use serde_json::{Value, json};

    use crate::handlers::test_support::*;

    #[actix_web::test]
    async fn booking_to_handover() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let seller = member(&state, "penjual", false).await;
        let buyer = member(&state, "pembeli", false).await;
        let admin = member(&state, "admin", true).await;
        let car = listed_car(&state, &seller, 200_000_000).await;

        let req = test::TestRequest::post()
            .uri("/transactions")
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({ "car_id": car.id, "payment_method": "bank_transfer" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let detail: Value = test::read_body_json(resp).await;
        assert_eq!(detail["transaction"]["booking_fee"], 10_000_000);
        assert_eq!(detail["summary"]["next_action"], "buyer_pays_booking_fee");
        let id = detail["transaction"]["id"].as_i64().unwrap();

        // the reserved car cannot be booked twice
        let other = member(&state, "lain", false).await;
        let req = test::TestRequest::post()
            .uri("/transactions")
            .cookie(cookie(&signer, &other))
            .set_json(json!({ "car_id": car.id }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        // proofs must point at an uploaded file
        for bogus in ["payment-proofs/1-bukti.jpg", "payment-proofs/../../etc/passwd"] {
            let req = test::TestRequest::post()
                .uri(&format!("/transactions/{}/booking-payment", id))
                .cookie(cookie(&signer, &buyer))
                .set_json(json!({ "proof": bogus }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        }

        let proof = stored(&state, Bucket::PaymentProofs, "bukti.jpg").await;
        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/booking-payment", id))
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({
                "proof": proof,
                "bank_name": "BCA",
                "account_holder": "Pembeli"
            }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let payment_id = detail["payments"][0]["id"].as_i64().unwrap();
        assert_eq!(detail["payments"][0]["status"], "uploaded");

        // only admins confirm
        let req = test::TestRequest::post()
            .uri(&format!("/admin/transactions/{}/payments/{}/confirm", id, payment_id))
            .cookie(cookie(&signer, &seller))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri(&format!("/admin/transactions/{}/payments/{}/confirm", id, payment_id))
            .cookie(cookie(&signer, &admin))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["transaction"]["booking_status"], "booking_paid");

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/final-payment", id))
            .cookie(cookie(&signer, &seller))
            .set_json(json!({ "method": "full" }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["transaction"]["status"], "completed");
        assert_eq!(detail["transaction"]["payment_status"], "paid");

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/handover", id))
            .cookie(cookie(&signer, &seller))
            .set_json(json!({ "photo": stored(&state, Bucket::HandoverPhotos, "serah.jpg").await }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert!(detail["transaction"]["handover_at"].is_string());

        let car = state.db.get_car(car.id).await.unwrap().unwrap();
        assert_eq!(car.status, CarStatus::Sold);

        let req = test::TestRequest::get()
            .uri(&format!("/transactions/{}", id))
            .cookie(cookie(&signer, &other))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/my/transactions?role=seller")
            .cookie(cookie(&signer, &seller))
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["total"], 1);
    }

    #[actix_web::test]
    async fn rejected_then_cancelled() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let seller = member(&state, "penjual", false).await;
        let buyer = member(&state, "pembeli", false).await;
        let admin = member(&state, "admin", true).await;
        let car = listed_car(&state, &seller, 80_000_000).await;

        let req = test::TestRequest::post()
            .uri("/transactions")
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({ "car_id": car.id }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let id = detail["transaction"]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/booking-payment", id))
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({ "proof": stored(&state, Bucket::PaymentProofs, "buram.jpg").await }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let payment_id = detail["payments"][0]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/admin/transactions/{}/payments/{}/reject", id, payment_id))
            .cookie(cookie(&signer, &admin))
            .set_json(json!({ "reason": "Bukti tidak terbaca" }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["transaction"]["booking_status"], "booking_rejected");
        assert_eq!(detail["payments"][0]["rejection_count"], 1);

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/cancel", id))
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({ "reason": "  " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{}/cancel", id))
            .cookie(cookie(&signer, &buyer))
            .set_json(json!({ "reason": "Berubah pikiran" }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["transaction"]["status"], "cancelled");

        let car = state.db.get_car(car.id).await.unwrap().unwrap();
        assert_eq!(car.status, CarStatus::Available);

        let req = test::TestRequest::get()
            .uri("/admin/transactions?status=cancelled")
            .cookie(cookie(&signer, &admin))
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["total"], 1);
    }
}
