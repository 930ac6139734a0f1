use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Published,
    Archived,
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArticleCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub featured_image: Option<String>,
    pub status: ArticleStatus,
    pub is_featured: bool,
    pub is_pinned: bool,
    pub reading_time_minutes: i64,
    pub view_count: i64,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default = "default_status")]
    pub status: ArticleStatus,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_pinned: bool,
    /// Go-live time of a `scheduled` article.
    #[serde(default)]
    pub scheduled_at: Option<NaiveDateTime>,
}

fn default_status() -> ArticleStatus {
    ArticleStatus::Draft
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSort {
    #[default]
    Newest,
    Oldest,
    Popular,
    TitleAz,
    TitleZa,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleFilter {
    pub category_id: Option<i64>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub sort: ArticleSort,
}
