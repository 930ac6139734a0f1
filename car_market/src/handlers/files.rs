use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, delete, get, post, web};
use common::{AuthUser, DomainError};
use tokio_stream::StreamExt;

use crate::handlers::failure;
use crate::state::AppState;
use crate::storage::{Bucket, content_type};
use crate::sweeper::sweep_once;

/// Reads the `file` field of a multipart form, refusing bodies above
/// `max_bytes` before they are fully buffered.
async fn read_file_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), Error> {
    while let Some(field) = payload.next().await {
        let mut field = field?;
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(failure(
                    DomainError::invalid(format!("File is larger than {} KB", max_bytes / 1024))
                        .into(),
                    "Upload rejected",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok((filename, bytes));
    }
    Err(failure(
        DomainError::invalid("Form field `file` is missing").into(),
        "Upload rejected",
    ))
}

fn bucket(name: &str) -> Result<Bucket, Error> {
    Bucket::parse(name).map_err(|e| failure(e.into(), "Unknown bucket"))
}

#[post("/uploads/{bucket}")]
pub async fn upload_file(
    path: web::Path<String>,
    mut payload: Multipart,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let bucket = bucket(&path.into_inner())?;
    let (filename, bytes) = read_file_field(&mut payload, app_state.storage.max_bytes()).await?;
    let stored = app_state
        .storage
        .save(bucket, &filename, &bytes)
        .await
        .map_err(|e| failure(e, "Failed to store file"))?;
    log::debug!("User {} uploaded {}", user.username, stored.path);
    Ok(HttpResponse::Created().json(stored))
}

#[get("/files/{bucket}/{name}")]
pub async fn get_file(
    path: web::Path<(String, String)>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (bucket_name, name) = path.into_inner();
    let bytes = app_state
        .storage
        .read(bucket(&bucket_name)?, &name)
        .await
        .map_err(|e| failure(e, "Failed to read file"))?;
    Ok(HttpResponse::Ok()
        .content_type(content_type(&name))
        .body(bytes))
}

#[delete("/files/{bucket}/{name}")]
pub async fn delete_file(
    path: web::Path<(String, String)>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (bucket_name, name) = path.into_inner();
    app_state
        .storage
        .delete(bucket(&bucket_name)?, &name)
        .await
        .map_err(|e| failure(e, "Failed to delete file"))?;
    log::info!("Admin {} deleted {}/{}", user.username, bucket_name, name);
    Ok(HttpResponse::NoContent().finish())
}

/// Runs the housekeeping pass right away instead of waiting for the timer.
#[post("/sweep")]
pub async fn run_sweep(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let report = sweep_once(&app_state)
        .await
        .map_err(|e| failure(e, "Failed to run housekeeping"))?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    use crate::handlers::test_support::*;

    const BOUNDARY: &str = "----carmarketboundary";

    fn form(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn upload_then_download() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let user = member(&state, "sari", false).await;
        let admin = member(&state, "admin", true).await;

        let req = upload("/uploads/payment-proofs", form("file", "bukti.PNG", b"\x89PNG fake"))
            .cookie(cookie(&signer, &user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let stored: Value = test::read_body_json(resp).await;
        let path = stored["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("payment-proofs/"));
        assert!(path.ends_with(".png"));

        let req = test::TestRequest::get()
            .uri(&format!("/files/{}", path))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"\x89PNG fake");

        let req = test::TestRequest::delete()
            .uri(&format!("/admin/files/{}", path))
            .cookie(cookie(&signer, &admin))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri(&format!("/files/{}", path))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn bad_uploads_are_refused() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let user = member(&state, "sari", false).await;

        let req = upload("/uploads/payment-proofs", form("file", "run.sh", b"echo hi"))
            .cookie(cookie(&signer, &user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = upload("/uploads/secrets", form("file", "a.png", b"x"))
            .cookie(cookie(&signer, &user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = upload("/uploads/car-images", form("photo", "a.png", b"x"))
            .cookie(cookie(&signer, &user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let big = vec![0u8; 2 * 1024 * 1024];
        let req = upload("/uploads/car-images", form("file", "big.jpg", &big))
            .cookie(cookie(&signer, &user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = upload("/uploads/car-images", form("file", "a.png", b"x")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn admin_can_trigger_sweep() {
        let state = state().await;
        let (app, signer) = test_app!(state.clone());
        let admin = member(&state, "admin", true).await;

        let req = test::TestRequest::post()
            .uri("/admin/sweep")
            .cookie(cookie(&signer, &admin))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
