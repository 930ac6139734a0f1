use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CarStatus {
    /// Waiting for admin approval.
    Pending,
    Available,
    /// Held by an active booking.
    Reserved,
    Sold,
    Rejected,
    /// Listing window ran out.
    Expired,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Pending => "pending",
            CarStatus::Available => "available",
            CarStatus::Reserved => "reserved",
            CarStatus::Sold => "sold",
            CarStatus::Rejected => "rejected",
            CarStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Car {
    pub id: i64,
    pub seller_id: i64,
    pub brand: String,
    pub model: String,
    pub year: i64,
    pub price: i64,
    pub mileage: i64,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub color: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: CarStatus,
    pub package_id: Option<i64>,
    pub listing_start_date: Option<NaiveDateTime>,
    pub listing_end_date: Option<NaiveDateTime>,
    pub refresh_count: i64,
    pub last_refreshed_at: Option<NaiveDateTime>,
    pub view_count: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Photo of a listing. The first photo added becomes the primary one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CarImage {
    pub id: i64,
    pub car_id: i64,
    pub image_url: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub display_order: i64,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarImageInput {
    /// Reference to an upload in the `car-images` bucket.
    pub image: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Seller-editable fields of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarInput {
    pub brand: String,
    pub model: String,
    pub year: i64,
    pub price: i64,
    #[serde(default)]
    pub mileage: i64,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarFilter {
    pub search: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_year: Option<i64>,
    pub max_year: Option<i64>,
    pub status: Option<CarStatus>,
    pub seller_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerStats {
    pub total: i64,
    pub active: i64,
    pub pending: i64,
    pub reserved: i64,
    pub sold: i64,
    pub expired: i64,
    pub total_views: i64,
}
