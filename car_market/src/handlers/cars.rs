use actix_web::{Error, HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use common::{AuthUser, CarFilter, CarImageInput, CarInput, CarStatus};
use serde::Deserialize;

use crate::handlers::{PageQuery, failure, not_found, uploaded};
use crate::state::AppState;
use crate::storage::Bucket;

/// Statuses anyone may browse.
fn is_public(status: CarStatus) -> bool {
    matches!(
        status,
        CarStatus::Available | CarStatus::Reserved | CarStatus::Sold
    )
}

#[get("/cars")]
pub async fn search_cars(
    filter: web::Query<CarFilter>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut filter = filter.into_inner();
    filter.status = Some(
        filter
            .status
            .filter(|s| is_public(*s))
            .unwrap_or(CarStatus::Available),
    );
    let cars = app_state
        .db
        .search_cars(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to search cars"))?;
    Ok(HttpResponse::Ok().json(cars))
}

#[get("/cars/{id}")]
pub async fn get_car(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = path.into_inner();
    let car = app_state
        .db
        .get_car(id)
        .await
        .map_err(|e| failure(e, "Failed to get car"))?
        .filter(|car| is_public(car.status))
        .ok_or_else(|| not_found("Car"))?;

    let car = app_state
        .db
        .view_car(car.id)
        .await
        .map_err(|e| failure(e, "Failed to get car"))?
        .ok_or_else(|| not_found("Car"))?;
    Ok(HttpResponse::Ok().json(car))
}

#[post("/cars")]
pub async fn create_car(
    input: web::Json<CarInput>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let car = app_state
        .db
        .create_car(user.id, &input)
        .await
        .map_err(|e| failure(e, "Failed to create listing"))?;
    log::info!("User {} listed car {}", user.username, car.id);
    Ok(HttpResponse::Created().json(car))
}

#[put("/cars/{id}")]
pub async fn update_car(
    path: web::Path<i64>,
    input: web::Json<CarInput>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let car = app_state
        .db
        .update_car(path.into_inner(), user.id, &input)
        .await
        .map_err(|e| failure(e, "Failed to update listing"))?;
    Ok(HttpResponse::Ok().json(car))
}

#[delete("/cars/{id}")]
pub async fn delete_car(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = path.into_inner();
    app_state
        .db
        .delete_car(id, user.id)
        .await
        .map_err(|e| failure(e, "Failed to delete listing"))?;
    log::info!("User {} deleted car {}", user.username, id);
    Ok(HttpResponse::NoContent().finish())
}

#[post("/cars/{id}/refresh")]
pub async fn refresh_car(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let car = app_state
        .db
        .refresh_car(path.into_inner(), user.id, Utc::now().naive_utc())
        .await
        .map_err(|e| failure(e, "Failed to refresh listing"))?;
    Ok(HttpResponse::Ok().json(car))
}

#[get("/cars/{id}/images")]
pub async fn get_car_images(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = path.into_inner();
    app_state
        .db
        .get_car(id)
        .await
        .map_err(|e| failure(e, "Failed to get car"))?
        .filter(|car| is_public(car.status))
        .ok_or_else(|| not_found("Car"))?;
    let images = app_state
        .db
        .car_images(id)
        .await
        .map_err(|e| failure(e, "Failed to get car photos"))?;
    Ok(HttpResponse::Ok().json(images))
}

#[post("/cars/{id}/images")]
pub async fn add_car_image(
    path: web::Path<i64>,
    input: web::Json<CarImageInput>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut input = input.into_inner();
    input.image = uploaded(&app_state, Bucket::CarImages, Some(input.image))
        .await?
        .unwrap_or_default();
    let image = app_state
        .db
        .add_car_image(path.into_inner(), user.id, &input)
        .await
        .map_err(|e| failure(e, "Failed to add photo"))?;
    Ok(HttpResponse::Created().json(image))
}

#[put("/cars/{id}/images/{image_id}/primary")]
pub async fn set_primary_car_image(
    path: web::Path<(i64, i64)>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (id, image_id) = path.into_inner();
    let images = app_state
        .db
        .set_primary_car_image(id, image_id, user.id)
        .await
        .map_err(|e| failure(e, "Failed to set primary photo"))?;
    Ok(HttpResponse::Ok().json(images))
}

#[delete("/cars/{id}/images/{image_id}")]
pub async fn delete_car_image(
    path: web::Path<(i64, i64)>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (id, image_id) = path.into_inner();
    let image = app_state
        .db
        .delete_car_image(id, image_id, user.id, user.is_superuser)
        .await
        .map_err(|e| failure(e, "Failed to delete photo"))?;

    if let Some(name) = image
        .image_url
        .strip_prefix(Bucket::CarImages.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    {
        if let Err(e) = app_state.storage.delete(Bucket::CarImages, name).await {
            log::warn!("Photo {} removed but its file stayed: {:#}", image.image_url, e);
        }
    }
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
struct MyCarsQuery {
    status: Option<CarStatus>,
}

#[get("/my/cars")]
pub async fn my_cars(
    query: web::Query<MyCarsQuery>,
    paging: web::Query<PageQuery>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let filter = CarFilter {
        seller_id: Some(user.id),
        status: query.status,
        ..Default::default()
    };
    let cars = app_state
        .db
        .search_cars(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to get your listings"))?;
    Ok(HttpResponse::Ok().json(cars))
}

#[get("/my/cars/stats")]
pub async fn my_car_stats(
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let stats = app_state
        .db
        .seller_stats(user.id)
        .await
        .map_err(|e| failure(e, "Failed to get listing statistics"))?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/cars")]
pub async fn admin_cars(
    filter: web::Query<CarFilter>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let cars = app_state
        .db
        .search_cars(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to search cars"))?;
    Ok(HttpResponse::Ok().json(cars))
}

#[derive(Debug, Deserialize)]
pub struct ReviewData {
    pub approve: bool,
}

#[post("/cars/{id}/review")]
pub async fn review_car(
    path: web::Path<i64>,
    data: web::Json<ReviewData>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = path.into_inner();
    let car = app_state
        .db
        .review_car(id, data.approve)
        .await
        .map_err(|e| failure(e, "Failed to review listing"))?;
    log::info!(
        "Admin {} reviewed car {}: {}",
        user.username,
        id,
        car.status.as_str()
    );
    Ok(HttpResponse::Ok().json(car))
}
