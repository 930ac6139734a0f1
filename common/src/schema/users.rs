use anyhow::anyhow;
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::NaiveDateTime;
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superuser: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Claims carried in the access and refresh cookies.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, actix_jwt_auth_middleware::FromRequest,
)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username.clone(),
            is_superuser: user.is_superuser,
        }
    }
}

impl User {
    pub fn new(
        username: &str,
        email: &str,
        password: &str,
        is_superuser: bool,
    ) -> anyhow::Result<Self> {
        if !validate_username(username)? {
            return Err(anyhow!(
                "Username must be at least 3 characters and contain only letters, numbers, or underscores."
            ));
        }

        if !validate_email(email)? {
            return Err(anyhow!("Invalid email address."));
        }

        if !validate_password(password)? {
            return Err(anyhow!(
                "Password must be at least 8 characters long and include at least one lowercase letter, one uppercase letter, and one number."
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?
            .to_string();

        Ok(User {
            id: 0, //set by DB
            username: username.to_string(),
            email: email.to_string(),
            full_name: None,
            phone: None,
            password_hash,
            is_superuser,
            created_at: None, //set by DB
            updated_at: None, //set by DB
        })
    }

    pub fn with_profile(mut self, full_name: Option<String>, phone: Option<String>) -> Self {
        self.full_name = full_name.filter(|n| !n.trim().is_empty());
        self.phone = phone.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn verify_password(&self, password: &str) -> anyhow::Result<()> {
        let hash = PasswordHash::new(&self.password_hash)
            .map_err(|e| anyhow!("Failed to parse password hash: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .map_err(|e| anyhow!("Password not match: {}", e))
    }
}

fn validate_username(username: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,}$").ok());
    match &*RE {
        Some(re) => re
            .is_match(username)
            .map_err(|e| anyhow!("Regex error for username: {e}")),
        None => Err(anyhow!(
            "Username regex failed to compile. Rejecting all usernames."
        )),
    }
}

fn validate_email(email: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
    match &*RE {
        Some(re) => re
            .is_match(email)
            .map_err(|e| anyhow!("Regex error for email: {e}")),
        None => Err(anyhow!(
            "Email regex failed to compile. Rejecting all emails."
        )),
    }
}

fn validate_password(password: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> =
        Lazy::new(|| Regex::new(r"^(?=.*[a-z])(?=.*[A-Z])(?=.*\d).{8,}$").ok());
    match &*RE {
        Some(re) => re
            .is_match(password)
            .map_err(|e| anyhow!("Regex error for password: {e}")),
        None => Err(anyhow!(
            "Password regex failed to compile. Rejecting all passwords."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_hashes_password() {
        let user = User::new("budi_s", "budi@example.com", "Rahasia123", false).unwrap();
        assert_ne!(user.password_hash, "Rahasia123");
        assert!(user.verify_password("Rahasia123").is_ok());
        assert!(user.verify_password("rahasia123").is_err());
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(User::new("ab", "budi@example.com", "Rahasia123", false).is_err());
        assert!(User::new("budi", "not-an-email", "Rahasia123", false).is_err());
        assert!(User::new("budi", "budi@example.com", "short1A", false).is_err());
        assert!(User::new("budi", "budi@example.com", "alllowercase1", false).is_err());
    }

    #[test]
    fn profile_drops_blank_fields() {
        let user = User::new("siti", "siti@example.com", "Rahasia123", false)
            .unwrap()
            .with_profile(Some("Siti Aminah".into()), Some("  ".into()));
        assert_eq!(user.full_name.as_deref(), Some("Siti Aminah"));
        assert_eq!(user.phone, None);
    }
}
