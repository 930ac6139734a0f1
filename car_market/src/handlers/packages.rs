use actix_web::{Error, HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use common::{AuthUser, DomainError, ListingPaymentStatus, PackageFilter, PackageInput};
use serde::Deserialize;

use crate::handlers::{failure, not_found, uploaded};
use crate::state::AppState;
use crate::storage::Bucket;

#[get("/packages")]
pub async fn get_packages(
    filter: web::Query<PackageFilter>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut filter = filter.into_inner();
    filter.is_active = Some(true);
    let packages = app_state
        .db
        .list_packages(&filter)
        .await
        .map_err(|e| failure(e, "Failed to get packages"))?;
    Ok(HttpResponse::Ok().json(packages))
}

#[get("/packages/{id}")]
pub async fn get_package(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let package = app_state
        .db
        .get_package(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to get package"))?
        .filter(|p| p.is_active)
        .ok_or_else(|| not_found("Package"))?;
    Ok(HttpResponse::Ok().json(package))
}

#[get("/packages")]
pub async fn admin_packages(
    filter: web::Query<PackageFilter>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let packages = app_state
        .db
        .list_packages(&filter)
        .await
        .map_err(|e| failure(e, "Failed to get packages"))?;
    Ok(HttpResponse::Ok().json(packages))
}

#[get("/packages/stats")]
pub async fn package_stats(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let stats = app_state
        .db
        .package_stats()
        .await
        .map_err(|e| failure(e, "Failed to get package statistics"))?;
    Ok(HttpResponse::Ok().json(stats))
}

#[post("/packages")]
pub async fn create_package(
    input: web::Json<PackageInput>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let package = app_state
        .db
        .create_package(&input)
        .await
        .map_err(|e| failure(e, "Failed to create package"))?;
    log::info!("Package {} created", package.slug);
    Ok(HttpResponse::Created().json(package))
}

#[put("/packages/{id}")]
pub async fn update_package(
    path: web::Path<i64>,
    input: web::Json<PackageInput>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let package = app_state
        .db
        .update_package(path.into_inner(), &input)
        .await
        .map_err(|e| failure(e, "Failed to update package"))?;
    Ok(HttpResponse::Ok().json(package))
}

#[post("/packages/{id}/toggle")]
pub async fn toggle_package(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let package = app_state
        .db
        .toggle_package_active(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to toggle package"))?;
    Ok(HttpResponse::Ok().json(package))
}

#[delete("/packages/{id}")]
pub async fn delete_package(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    app_state
        .db
        .delete_package(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to delete package"))?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
pub struct PurchaseData {
    pub car_id: i64,
    pub package_id: i64,
    #[serde(default = "default_method")]
    pub payment_method: String,
}

fn default_method() -> String {
    "bank_transfer".to_string()
}

#[post("/listing-payments")]
pub async fn buy_package(
    data: web::Json<PurchaseData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payment = app_state
        .db
        .create_listing_payment(
            user.id,
            data.car_id,
            data.package_id,
            &data.payment_method,
            Utc::now().naive_utc(),
        )
        .await
        .map_err(|e| failure(e, "Failed to buy package"))?;
    log::info!(
        "User {} bought package {} for car {} ({})",
        user.username,
        data.package_id,
        data.car_id,
        payment.reference_code
    );
    Ok(HttpResponse::Created().json(payment))
}

#[get("/my/listing-payments")]
pub async fn my_listing_payments(
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payments = app_state
        .db
        .list_listing_payments(Some(user.id), None)
        .await
        .map_err(|e| failure(e, "Failed to get listing payments"))?;
    Ok(HttpResponse::Ok().json(payments))
}

#[derive(Debug, Deserialize)]
pub struct ProofData {
    pub proof: String,
}

#[post("/listing-payments/{id}/proof")]
pub async fn upload_listing_proof(
    path: web::Path<i64>,
    data: web::Json<ProofData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let proof = uploaded(&app_state, Bucket::PaymentProofs, Some(data.into_inner().proof))
        .await?
        .ok_or_else(|| {
            failure(
                DomainError::invalid("Payment proof is required").into(),
                "Failed to attach payment proof",
            )
        })?;
    let payment = app_state
        .db
        .upload_listing_proof(path.into_inner(), user.id, &proof)
        .await
        .map_err(|e| failure(e, "Failed to attach payment proof"))?;
    Ok(HttpResponse::Ok().json(payment))
}

#[derive(Debug, Deserialize)]
struct ListingPaymentQuery {
    status: Option<ListingPaymentStatus>,
}

#[get("/listing-payments")]
pub async fn admin_listing_payments(
    query: web::Query<ListingPaymentQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payments = app_state
        .db
        .list_listing_payments(None, query.status)
        .await
        .map_err(|e| failure(e, "Failed to get listing payments"))?;
    Ok(HttpResponse::Ok().json(payments))
}

#[derive(Debug, Deserialize)]
pub struct VerifyData {
    pub approve: bool,
}

#[post("/listing-payments/{id}/verify")]
pub async fn verify_listing_payment(
    path: web::Path<i64>,
    data: web::Json<VerifyData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let payment = app_state
        .db
        .verify_listing_payment(path.into_inner(), user.id, data.approve, Utc::now().naive_utc())
        .await
        .map_err(|e| failure(e, "Failed to verify listing payment"))?;
    log::info!(
        "Admin {} settled listing payment {}",
        user.username,
        payment.reference_code
    );
    Ok(HttpResponse::Ok().json(payment))
}
