use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InterestType {
    Flat,
    Efektif,
    Anuitas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum InsuranceType {
    /// Total loss only.
    #[serde(rename = "TLO")]
    #[sqlx(rename = "TLO")]
    Tlo,
    #[serde(rename = "Allrisk")]
    #[sqlx(rename = "Allrisk")]
    Allrisk,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreditParameter {
    pub id: i64,
    pub partner_name: String,
    pub name: String,
    pub min_dp_percentage: f64,
    pub max_dp_percentage: f64,
    pub tenor_months: i64,
    pub interest_rate_yearly: f64,
    pub interest_type: InterestType,
    pub admin_fee: i64,
    pub provision_fee_percentage: f64,
    pub fidusia_fee: i64,
    pub insurance_tlo_percentage: f64,
    pub insurance_allrisk_percentage: f64,
    pub life_insurance_percentage: f64,
    pub min_otr: Option<i64>,
    pub max_otr: Option<i64>,
    pub is_active: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditParameterInput {
    pub partner_name: String,
    pub name: String,
    pub min_dp_percentage: f64,
    pub max_dp_percentage: f64,
    pub tenor_months: i64,
    pub interest_rate_yearly: f64,
    pub interest_type: InterestType,
    #[serde(default)]
    pub admin_fee: i64,
    #[serde(default)]
    pub provision_fee_percentage: f64,
    #[serde(default)]
    pub fidusia_fee: i64,
    #[serde(default)]
    pub insurance_tlo_percentage: f64,
    #[serde(default)]
    pub insurance_allrisk_percentage: f64,
    #[serde(default)]
    pub life_insurance_percentage: f64,
    #[serde(default)]
    pub min_otr: Option<i64>,
    #[serde(default)]
    pub max_otr: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Outcome of a simulation, before it is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub otr_price: f64,
    pub down_payment: f64,
    pub down_payment_percentage: f64,
    pub loan_amount: f64,
    pub tenor_months: i64,
    pub interest_rate_yearly: f64,
    pub interest_type: InterestType,
    pub monthly_installment: f64,
    pub total_interest: f64,
    pub admin_fee: f64,
    pub provision_fee: f64,
    pub fidusia_fee: f64,
    pub life_insurance: f64,
    pub vehicle_insurance_type: InsuranceType,
    pub vehicle_insurance_yearly: f64,
    pub vehicle_insurance_total: f64,
    pub total_initial_payment: f64,
    pub total_payment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub month: i64,
    pub principal: f64,
    pub interest: f64,
    pub installment: f64,
    pub remaining_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreditSimulation {
    pub id: i64,
    pub user_id: i64,
    pub car_id: Option<i64>,
    pub credit_parameter_id: Option<i64>,
    pub partner_name: Option<String>,
    pub otr_price: i64,
    pub down_payment: i64,
    pub down_payment_percentage: f64,
    pub loan_amount: i64,
    pub tenor_months: i64,
    pub interest_rate_yearly: f64,
    pub interest_type: InterestType,
    pub monthly_installment: i64,
    pub total_interest: i64,
    pub admin_fee: i64,
    pub provision_fee: i64,
    pub fidusia_fee: i64,
    pub life_insurance: i64,
    pub vehicle_insurance_type: InsuranceType,
    pub vehicle_insurance_yearly: i64,
    pub vehicle_insurance_total: i64,
    pub total_initial_payment: i64,
    pub total_payment: i64,
    pub is_saved: bool,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub total_simulations: i64,
    pub saved_simulations: i64,
    pub avg_monthly_payment: f64,
    pub most_common_partner: Option<String>,
}
