use actix_web::{Error, HttpResponse, delete, get, put, web};
use common::PaymentStatus;
use serde::Deserialize;

use crate::handlers::{PageQuery, failure, not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PaymentQuery {
    status: Option<PaymentStatus>,
}

#[get("/payments")]
pub async fn get_payments(
    query: web::Query<PaymentQuery>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    match query.status {
        Some(status) => {
            let payments = app_state
                .db
                .payments_by_status(status)
                .await
                .map_err(|e| failure(e, "Failed to get payments"))?;
            Ok(HttpResponse::Ok().json(payments))
        }
        None => {
            let payments = app_state
                .db
                .list_payments(paging.page())
                .await
                .map_err(|e| failure(e, "Failed to get payments"))?;
            Ok(HttpResponse::Ok().json(payments))
        }
    }
}

#[get("/payments/pending")]
pub async fn payments_needing_verification(
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payments = app_state
        .db
        .payments_needing_verification()
        .await
        .map_err(|e| failure(e, "Failed to get payments waiting for verification"))?;
    Ok(HttpResponse::Ok().json(payments))
}

#[get("/payments/rejected")]
pub async fn rejected_payments(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let payments = app_state
        .db
        .rejected_payments()
        .await
        .map_err(|e| failure(e, "Failed to get rejected payments"))?;
    Ok(HttpResponse::Ok().json(payments))
}

#[get("/payments/reference/{code}")]
pub async fn get_payment_by_reference(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let code = path.into_inner();
    let payment = app_state
        .db
        .get_payment_by_reference(&code)
        .await
        .map_err(|e| failure(e, "Failed to get payment"))?
        .ok_or_else(|| not_found("Payment"))?;
    Ok(HttpResponse::Ok().json(payment))
}

#[get("/payments/{id}")]
pub async fn get_payment(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payment = app_state
        .db
        .get_payment(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to get payment"))?
        .ok_or_else(|| not_found("Payment"))?;
    Ok(HttpResponse::Ok().json(payment))
}

#[derive(Debug, Deserialize)]
pub struct StatusData {
    pub status: PaymentStatus,
}

/// Manual correction. The purchase flow goes through the transaction
/// endpoints instead.
#[put("/payments/{id}/status")]
pub async fn update_payment_status(
    path: web::Path<i64>,
    data: web::Json<StatusData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = path.into_inner();
    let payment = app_state
        .db
        .update_payment_status(id, data.status)
        .await
        .map_err(|e| failure(e, "Failed to update payment"))?;
    log::warn!("Payment {} manually set to {:?}", id, data.status);
    Ok(HttpResponse::Ok().json(payment))
}

#[delete("/payments/{id}")]
pub async fn delete_payment(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    app_state
        .db
        .delete_payment(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to delete payment"))?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::handlers::test_support::*;

    #[actix_web::test]
    async fn admin_sees_pending_proofs() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let seller = member(&state, "penjual", false).await;
        let buyer = member(&state, "pembeli", false).await;
        let admin = member(&state, "admin", true).await;
        let car = listed_car(&state, &seller, 60_000_000).await;

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
            .set_json(json!({ "proof": stored(&state, Bucket::PaymentProofs, "bukti.png").await }))
            .to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let reference = detail["payments"][0]["reference_code"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(reference.starts_with("PAY-"));

        let req = test::TestRequest::get()
            .uri("/admin/payments/pending")
            .cookie(cookie(&signer, &admin))
            .to_request();
        let pending: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri(&format!("/admin/payments/reference/{}", reference))
            .cookie(cookie(&signer, &admin))
            .to_request();
        let payment: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(payment["status"], "uploaded");

        let req = test::TestRequest::get()
            .uri("/admin/payments?status=uploaded")
            .cookie(cookie(&signer, &admin))
            .to_request();
        let uploaded: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(uploaded.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri("/admin/payments/999")
            .cookie(cookie(&signer, &admin))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
