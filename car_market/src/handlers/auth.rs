use crate::handlers::{failure, not_found};
use crate::state::AppState;
use actix_jwt_auth_middleware::TokenSigner;
use actix_web::Error;
use actix_web::{HttpResponse, error::InternalError, get, http::StatusCode, post, web};
use common::{AuthUser, DomainError, User};
use jwt_compact::alg::Ed25519;

#[derive(Debug, serde::Deserialize)]
pub struct LoginData {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct RegisterData {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[post("/auth/register")]
pub async fn register(
    data: web::Json<RegisterData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let user = User::new(data.username.trim(), data.email.trim(), &data.password, false)
        .map_err(|e| failure(DomainError::invalid(e.to_string()).into(), "Registration rejected"))?
        .with_profile(data.full_name, data.phone);

    let taken = app_state
        .db
        .user_exists(&user.username, &user.email)
        .await
        .map_err(|e| failure(e, "Failed to register"))?;
    if taken {
        return Err(failure(
            DomainError::Conflict("Username or email is already registered".into()).into(),
            "Registration rejected",
        ));
    }

    let user = app_state
        .db
        .create_user(&user)
        .await
        .map_err(|e| failure(e, "Failed to register"))?;
    log::info!("Registered user {}", user.username);
    Ok(HttpResponse::Created().json(user))
}

#[post("/auth/login")]
pub async fn login(
    login_data: web::Json<LoginData>,
    app_state: web::Data<AppState>,
    cookie_signer: web::Data<TokenSigner<AuthUser, Ed25519>>,
) -> Result<HttpResponse, Error> {
    let user = app_state
        .db
        .get_user(&login_data.username)
        .await
        .map_err(|e| failure(e, "Failed to log in"))?
        .ok_or_else(|| {
            log::warn!("Failed to get User with username: {}", login_data.username);
            InternalError::new("Invalid username or password", StatusCode::UNAUTHORIZED)
        })?;

    if let Err(err) = user.verify_password(&login_data.password) {
        log::warn!(
            "Invalid password for user {}: {:?}",
            login_data.username,
            err
        );
        return Ok(HttpResponse::Unauthorized().body("Invalid username or password"));
    }

    let claims = AuthUser::from(&user);
    let access_cookie = cookie_signer.create_access_cookie(&claims).map_err(|err| {
        log::error!("Failed to create access token: {:?}", err);
        InternalError::new("Token error", StatusCode::INTERNAL_SERVER_ERROR)
    })?;

    let refresh_cookie = cookie_signer.create_refresh_cookie(&claims).map_err(|err| {
        log::error!("Failed to create refresh token: {:?}", err);
        InternalError::new("Token error", StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .json(user))
}

#[get("/auth/me")]
pub async fn me(user: AuthUser, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let user = app_state
        .db
        .get_user_by_id(user.id)
        .await
        .map_err(|e| failure(e, "Failed to get profile"))?
        .ok_or_else(|| not_found("User"))?;
    Ok(HttpResponse::Ok().json(user))
}
