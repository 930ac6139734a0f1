use actix_web::{Error, HttpResponse, delete, get, post, put, web};
use common::credit::{amortization, simulate_with_tenor};
use common::{
    AmortizationRow, AuthUser, CreditParameter, CreditParameterInput, InsuranceType, SimulationResult,
};
use serde::{Deserialize, Serialize};

use crate::handlers::{failure, not_found};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SimulationRequest {
    pub credit_parameter_id: i64,
    pub otr_price: f64,
    pub down_payment: f64,
    pub insurance_type: InsuranceType,
    /// Defaults to the parameter's tenor.
    #[serde(default)]
    pub tenor_months: Option<i64>,
    #[serde(default)]
    pub car_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub with_schedule: bool,
}

#[derive(Debug, Serialize)]
struct SimulationResponse {
    result: SimulationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Vec<AmortizationRow>>,
}

async fn run_simulation(
    app_state: &AppState,
    request: &SimulationRequest,
) -> Result<(CreditParameter, SimulationResult), Error> {
    let parameter = app_state
        .db
        .get_credit_parameter(request.credit_parameter_id)
        .await
        .map_err(|e| failure(e, "Failed to get credit parameter"))?
        .ok_or_else(|| not_found("Credit parameter"))?;
    let result = simulate_with_tenor(
        &parameter,
        request.otr_price,
        request.down_payment,
        request.insurance_type,
        request.tenor_months,
    )
    .map_err(|e| failure(e.into(), "Simulation rejected"))?;
    Ok((parameter, result))
}

#[get("/credit/parameters")]
pub async fn get_credit_parameters(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let parameters = app_state
        .db
        .list_credit_parameters(true)
        .await
        .map_err(|e| failure(e, "Failed to get credit parameters"))?;
    Ok(HttpResponse::Ok().json(parameters))
}

/// Computes without saving; open to anonymous visitors.
#[post("/credit/simulate")]
pub async fn simulate_credit(
    request: web::Json<SimulationRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (_, result) = run_simulation(&app_state, &request).await?;
    let schedule = request.with_schedule.then(|| amortization(&result));
    Ok(HttpResponse::Ok().json(SimulationResponse { result, schedule }))
}

#[post("/credit/simulations")]
pub async fn save_simulation(
    request: web::Json<SimulationRequest>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (parameter, result) = run_simulation(&app_state, &request).await?;
    let request = request.into_inner();
    let simulation = app_state
        .db
        .save_simulation(user.id, request.car_id, &parameter, &result, request.notes)
        .await
        .map_err(|e| failure(e, "Failed to save simulation"))?;
    Ok(HttpResponse::Created().json(simulation))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

#[get("/my/simulations")]
pub async fn my_simulations(
    query: web::Query<HistoryQuery>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 100);
    let simulations = app_state
        .db
        .user_simulations(user.id, limit)
        .await
        .map_err(|e| failure(e, "Failed to get simulations"))?;
    Ok(HttpResponse::Ok().json(simulations))
}

#[get("/my/simulations/stats")]
pub async fn my_simulation_stats(
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let stats = app_state
        .db
        .simulation_stats(user.id)
        .await
        .map_err(|e| failure(e, "Failed to get simulation statistics"))?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/simulations/{id}")]
pub async fn get_simulation(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let simulation = app_state
        .db
        .get_simulation(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to get simulation"))?
        .filter(|s| s.user_id == user.id || user.is_superuser)
        .ok_or_else(|| not_found("Simulation"))?;
    Ok(HttpResponse::Ok().json(simulation))
}

#[post("/simulations/{id}/toggle-saved")]
pub async fn toggle_simulation_saved(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let simulation = app_state
        .db
        .toggle_simulation_saved(path.into_inner(), user.id)
        .await
        .map_err(|e| failure(e, "Failed to update simulation"))?;
    Ok(HttpResponse::Ok().json(simulation))
}

#[delete("/simulations/{id}")]
pub async fn delete_simulation(
    path: web::Path<i64>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    app_state
        .db
        .delete_simulation(path.into_inner(), user.id)
        .await
        .map_err(|e| failure(e, "Failed to delete simulation"))?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/credit/parameters")]
pub async fn admin_credit_parameters(
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let parameters = app_state
        .db
        .list_credit_parameters(false)
        .await
        .map_err(|e| failure(e, "Failed to get credit parameters"))?;
    Ok(HttpResponse::Ok().json(parameters))
}

#[post("/credit/parameters")]
pub async fn create_credit_parameter(
    input: web::Json<CreditParameterInput>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let parameter = app_state
        .db
        .create_credit_parameter(&input)
        .await
        .map_err(|e| failure(e, "Failed to create credit parameter"))?;
    log::info!(
        "Credit parameter {} of {} created",
        parameter.name,
        parameter.partner_name
    );
    Ok(HttpResponse::Created().json(parameter))
}

#[put("/credit/parameters/{id}")]
pub async fn update_credit_parameter(
    path: web::Path<i64>,
    input: web::Json<CreditParameterInput>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let parameter = app_state
        .db
        .update_credit_parameter(path.into_inner(), &input)
        .await
        .map_err(|e| failure(e, "Failed to update credit parameter"))?;
    Ok(HttpResponse::Ok().json(parameter))
}

#[delete("/credit/parameters/{id}")]
pub async fn delete_credit_parameter(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    app_state
        .db
        .delete_credit_parameter(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to delete credit parameter"))?;
    Ok(HttpResponse::NoContent().finish())
}
