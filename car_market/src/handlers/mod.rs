mod articles;
mod auth;
mod cars;
mod credit;
mod files;
mod packages;
mod payments;
mod transactions;

use actix_web::{HttpResponse, Responder, error::InternalError, get, http::StatusCode};
use common::{DomainError, Page};
use serde::Deserialize;

use crate::state::AppState;
use crate::storage::Bucket;

pub use articles::*;
pub use auth::*;
pub use cars::*;
pub use credit::*;
pub use files::*;
pub use packages::*;
pub use payments::*;
pub use transactions::*;

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Welcome to Car Market!")
}

/// Turns a failed operation into a response. Rule violations keep their
/// message and get a matching status; anything else is logged and hidden
/// behind `what`.
pub(crate) fn failure(err: anyhow::Error, what: &str) -> actix_web::Error {
    match err.downcast_ref::<DomainError>() {
        Some(domain) => {
            log::warn!("{}: {}", what, domain);
            let status = match domain {
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::InvalidState(_) | DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::Invalid(_) => StatusCode::BAD_REQUEST,
            };
            InternalError::new(domain.to_string(), status).into()
        }
        None => {
            log::error!("{}: {:#}", what, err);
            InternalError::new(
                format!("{}. Please try again later.", what),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into()
        }
    }
}

/// Optional file reference from a request body, checked against storage.
pub(crate) async fn uploaded(
    app_state: &AppState,
    bucket: Bucket,
    reference: Option<String>,
) -> Result<Option<String>, actix_web::Error> {
    match reference.filter(|r| !r.trim().is_empty()) {
        Some(r) => app_state
            .storage
            .uploaded(bucket, &r)
            .await
            .map(Some)
            .map_err(|e| failure(e, "Unknown file reference")),
        None => Ok(None),
    }
}

pub(crate) fn not_found(what: &'static str) -> actix_web::Error {
    failure(DomainError::NotFound(what).into(), what)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

impl PageQuery {
    pub(crate) fn page(&self) -> Page {
        Page::new(self.page, self.per_page)
    }
}
