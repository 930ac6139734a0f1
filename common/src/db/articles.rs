use std::collections::HashSet;

use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite};

use super::{Database, Page, Paged, like};
use crate::article;
use crate::error::DomainError;
use crate::helpers::{slugify, unique_slug};
use crate::schema::{Article, ArticleCategory, ArticleFilter, ArticleInput, ArticleSort, ArticleStatus};

impl ArticleSort {
    fn order_by(&self) -> &'static str {
        match self {
            ArticleSort::Newest => "COALESCE(published_at, created_at) DESC, id DESC",
            ArticleSort::Oldest => "COALESCE(published_at, created_at) ASC, id ASC",
            ArticleSort::Popular => "view_count DESC, id DESC",
            ArticleSort::TitleAz => "title COLLATE NOCASE ASC",
            ArticleSort::TitleZa => "title COLLATE NOCASE DESC",
        }
    }
}

fn push_article_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ArticleFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND is_featured = ").push_bind(featured);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let term = like(search);
        qb.push(" AND (title LIKE ")
            .push_bind(term.clone())
            .push(" ESCAPE '\\' OR excerpt LIKE ")
            .push_bind(term)
            .push(" ESCAPE '\\')");
    }
}

impl Database {
    pub async fn list_categories(&self) -> anyhow::Result<Vec<ArticleCategory>> {
        sqlx::query_as::<_, ArticleCategory>("SELECT * FROM article_categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list article categories")
    }

    pub async fn create_category(&self, name: &str) -> anyhow::Result<ArticleCategory> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(DomainError::invalid("Category name is required").into());
        }
        let result = sqlx::query("INSERT INTO article_categories (name, slug) VALUES (?, ?)")
            .bind(name)
            .bind(&slug)
            .execute(&self.pool)
            .await;
        let id = match result {
            Ok(r) => r.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(DomainError::Conflict(format!("Category `{}` already exists", slug)).into());
            }
            Err(err) => return Err(err).context("Failed to save article category"),
        };
        sqlx::query_as::<_, ArticleCategory>("SELECT * FROM article_categories WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Saved category disappeared")
    }

    async fn ensure_category(&self, category_id: Option<i64>) -> anyhow::Result<()> {
        let Some(id) = category_id else {
            return Ok(());
        };
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM article_categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up article category {}", id))?;
        match found {
            Some(_) => Ok(()),
            None => Err(DomainError::NotFound("Article category").into()),
        }
    }

    async fn free_article_slug(&self, title: &str, own_id: Option<i64>) -> anyhow::Result<String> {
        let base = match slugify(title) {
            s if s.is_empty() => "artikel".to_string(),
            s => s,
        };
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, slug FROM articles WHERE slug LIKE ?")
                .bind(format!("{}%", base))
                .fetch_all(&self.pool)
                .await
                .context("Failed to look up article slugs")?;
        let taken: HashSet<String> = rows
            .into_iter()
            .filter(|(id, _)| Some(*id) != own_id)
            .map(|(_, slug)| slug)
            .collect();
        Ok(unique_slug(&base, |candidate| taken.contains(candidate)))
    }

    pub async fn create_article(
        &self,
        author_id: i64,
        input: &ArticleInput,
        now: NaiveDateTime,
    ) -> anyhow::Result<Article> {
        article::validate_article(input)?;
        self.ensure_category(input.category_id).await?;
        let slug = self.free_article_slug(&input.title, None).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO articles (
                title, slug, excerpt, content, category_id, author_id, featured_image,
                status, is_featured, is_pinned, reading_time_minutes, published_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.title.trim())
        .bind(&slug)
        .bind(&input.excerpt)
        .bind(&input.content)
        .bind(input.category_id)
        .bind(author_id)
        .bind(&input.featured_image)
        .bind(input.status)
        .bind(input.is_featured)
        .bind(input.is_pinned)
        .bind(article::reading_time(&input.content))
        .bind(article::published_at(input.status, input.scheduled_at, None, now))
        .execute(&self.pool)
        .await
        .context("Failed to save article")?;

        self.get_article(result.last_insert_rowid())
            .await?
            .context("Saved article disappeared")
    }

    pub async fn update_article(
        &self,
        id: i64,
        input: &ArticleInput,
        now: NaiveDateTime,
    ) -> anyhow::Result<Article> {
        let current = self
            .get_article(id)
            .await?
            .ok_or(DomainError::NotFound("Article"))?;
        article::validate_article(input)?;
        self.ensure_category(input.category_id).await?;
        let slug = if current.title == input.title.trim() {
            current.slug.clone()
        } else {
            self.free_article_slug(&input.title, Some(id)).await?
        };

        sqlx::query(
            r#"
            UPDATE articles SET
                title = ?, slug = ?, excerpt = ?, content = ?, category_id = ?,
                featured_image = ?, status = ?, is_featured = ?, is_pinned = ?,
                reading_time_minutes = ?, published_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(input.title.trim())
        .bind(&slug)
        .bind(&input.excerpt)
        .bind(&input.content)
        .bind(input.category_id)
        .bind(&input.featured_image)
        .bind(input.status)
        .bind(input.is_featured)
        .bind(input.is_pinned)
        .bind(article::reading_time(&input.content))
        .bind(article::published_at(
            input.status,
            input.scheduled_at,
            current.published_at,
            now,
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update article {}", id))?;

        self.get_article(id).await?.context("Updated article disappeared")
    }

    /// Publishes scheduled articles whose go-live time has come.
    pub async fn publish_scheduled(&self, now: NaiveDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE articles SET status = 'published', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'scheduled' AND published_at IS NOT NULL AND published_at <= ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to publish scheduled articles")?;
        Ok(result.rows_affected())
    }

    pub async fn delete_article(&self, id: i64) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete article {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Article").into());
        }
        Ok(())
    }

    pub async fn get_article(&self, id: i64) -> anyhow::Result<Option<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get article {}", id))
    }

    /// Public read by slug. Only published articles are visible and each read
    /// counts as a view.
    pub async fn read_article(&self, slug: &str) -> anyhow::Result<Option<Article>> {
        let updated = sqlx::query(
            "UPDATE articles SET view_count = view_count + 1 WHERE slug = ? AND status = 'published'",
        )
        .bind(slug)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to count view of article `{}`", slug))?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get article `{}`", slug))
    }

    /// Pinned articles come first whatever the sort.
    pub async fn list_articles(
        &self,
        filter: &ArticleFilter,
        page: Page,
    ) -> anyhow::Result<Paged<Article>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles WHERE 1 = 1");
        push_article_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count articles")?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM articles WHERE 1 = 1");
        push_article_filters(&mut qb, filter);
        qb.push(format!(" ORDER BY is_pinned DESC, {} LIMIT ", filter.sort.order_by()))
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = qb
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list articles")?;
        Ok(Paged::new(items, total, page))
    }

    pub async fn popular_articles(&self, limit: i64) -> anyhow::Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE status = ? ORDER BY view_count DESC, id DESC LIMIT ?",
        )
        .bind(ArticleStatus::Published)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get popular articles")
    }

    pub async fn featured_articles(&self, limit: i64) -> anyhow::Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles WHERE status = ? AND is_featured
            ORDER BY is_pinned DESC, COALESCE(published_at, created_at) DESC, id DESC LIMIT ?
            "#,
        )
        .bind(ArticleStatus::Published)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get featured articles")
    }
}
