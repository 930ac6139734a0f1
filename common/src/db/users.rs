use anyhow::Context;

use super::Database;
use crate::schema::User;

impl Database {
    pub async fn create_user(&self, user: &User) -> anyhow::Result<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, full_name, phone, password_hash, is_superuser)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.is_superuser)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save user `{}`", user.username))?;

        self.get_user_by_id(result.last_insert_rowid())
            .await?
            .context("Saved user disappeared")
    }

    pub async fn get_user(&self, username: &str) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get user `{}`", username))
    }

    pub async fn get_user_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get user with id {}", id))
    }

    pub async fn user_exists(&self, username: &str, email: &str) -> anyhow::Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check for existing user")?;
        Ok(count > 0)
    }
}
