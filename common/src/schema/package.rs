use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListingPackage {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_days: i64,
    pub max_photos: Option<i64>,
    pub is_featured: bool,
    pub is_highlighted: bool,
    pub priority_level: i64,
    pub allows_refresh: bool,
    pub refresh_count: i64,
    pub allows_badge: bool,
    pub badge_text: Option<String>,
    pub is_active: bool,
    pub display_order: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Package fields as submitted by an admin or read from the seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInput {
    pub name: String,
    /// Derived from `name` when empty.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: i64,
    pub duration_days: i64,
    #[serde(default)]
    pub max_photos: Option<i64>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_highlighted: bool,
    #[serde(default)]
    pub priority_level: i64,
    #[serde(default)]
    pub allows_refresh: bool,
    #[serde(default)]
    pub refresh_count: i64,
    #[serde(default)]
    pub allows_badge: bool,
    #[serde(default)]
    pub badge_text: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
}

fn default_true() -> bool {
    true
}

impl PackageInput {
    /// Loads a list of packages from a YAML seed file.
    pub async fn from_yaml_file(path: &str) -> anyhow::Result<Vec<PackageInput>> {
        let content = tokio::fs::read_to_string(path).await?;
        let packages: Vec<PackageInput> = serde_yaml::from_str(&content)?;
        log::debug!("Loaded {} listing packages from {}", packages.len(), path);
        Ok(packages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageSort {
    Name,
    Price,
    DurationDays,
    DisplayOrder,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageFilter {
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub is_highlighted: Option<bool>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    pub search: Option<String>,
    pub sort_by: Option<PackageSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageStats {
    pub total_packages: i64,
    pub active_packages: i64,
    pub featured_packages: i64,
    pub average_price: f64,
    pub most_popular_package: Option<String>,
    pub total_revenue: i64,
    pub active_listings: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ListingPaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Expired,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListingPayment {
    pub id: i64,
    pub car_id: i64,
    pub seller_id: i64,
    pub package_id: i64,
    pub amount: i64,
    pub payment_method: String,
    pub payment_status: ListingPaymentStatus,
    pub reference_code: String,
    pub proof_of_payment: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<NaiveDateTime>,
    pub activated_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}
