use actix_web::{Error, HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use common::{ArticleFilter, ArticleInput, ArticleStatus, AuthUser};
use serde::Deserialize;

use crate::handlers::{PageQuery, failure, not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(5).clamp(1, 50)
    }
}

#[get("/article-categories")]
pub async fn get_categories(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let categories = app_state
        .db
        .list_categories()
        .await
        .map_err(|e| failure(e, "Failed to get categories"))?;
    Ok(HttpResponse::Ok().json(categories))
}

#[get("/articles")]
pub async fn get_articles(
    filter: web::Query<ArticleFilter>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut filter = filter.into_inner();
    filter.status = Some(ArticleStatus::Published);
    let articles = app_state
        .db
        .list_articles(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to get articles"))?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/articles/popular")]
pub async fn popular_articles(
    query: web::Query<LimitQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let articles = app_state
        .db
        .popular_articles(query.limit())
        .await
        .map_err(|e| failure(e, "Failed to get popular articles"))?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/articles/featured")]
pub async fn featured_articles(
    query: web::Query<LimitQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let articles = app_state
        .db
        .featured_articles(query.limit())
        .await
        .map_err(|e| failure(e, "Failed to get featured articles"))?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/articles/{slug}")]
pub async fn read_article(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let slug = path.into_inner();
    let article = app_state
        .db
        .read_article(&slug)
        .await
        .map_err(|e| failure(e, "Failed to get article"))?
        .ok_or_else(|| not_found("Article"))?;
    Ok(HttpResponse::Ok().json(article))
}

#[derive(Debug, Deserialize)]
pub struct CategoryData {
    pub name: String,
}

#[post("/article-categories")]
pub async fn create_category(
    data: web::Json<CategoryData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let category = app_state
        .db
        .create_category(&data.name)
        .await
        .map_err(|e| failure(e, "Failed to create category"))?;
    Ok(HttpResponse::Created().json(category))
}

#[get("/articles")]
pub async fn admin_articles(
    filter: web::Query<ArticleFilter>,
    paging: web::Query<PageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let articles = app_state
        .db
        .list_articles(&filter, paging.page())
        .await
        .map_err(|e| failure(e, "Failed to get articles"))?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/articles/{id}")]
pub async fn admin_article(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let article = app_state
        .db
        .get_article(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to get article"))?
        .ok_or_else(|| not_found("Article"))?;
    Ok(HttpResponse::Ok().json(article))
}

#[post("/articles")]
pub async fn create_article(
    input: web::Json<ArticleInput>,
    user: AuthUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let article = app_state
        .db
        .create_article(user.id, &input, Utc::now().naive_utc())
        .await
        .map_err(|e| failure(e, "Failed to create article"))?;
    log::info!("Admin {} wrote article {}", user.username, article.slug);
    Ok(HttpResponse::Created().json(article))
}

#[put("/articles/{id}")]
pub async fn update_article(
    path: web::Path<i64>,
    input: web::Json<ArticleInput>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let article = app_state
        .db
        .update_article(path.into_inner(), &input, Utc::now().naive_utc())
        .await
        .map_err(|e| failure(e, "Failed to update article"))?;
    Ok(HttpResponse::Ok().json(article))
}

#[delete("/articles/{id}")]
pub async fn delete_article(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    app_state
        .db
        .delete_article(path.into_inner())
        .await
        .map_err(|e| failure(e, "Failed to delete article"))?;
    Ok(HttpResponse::NoContent().finish())
}
