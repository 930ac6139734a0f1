use std::str::FromStr;

use anyhow::Context;
use chrono::Duration;
use common::workflow::BookingPolicy;

use crate::state::AppState;

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub upload_dir: String,
    pub public_base_url: String,
    pub packages_yaml: Option<String>,
    pub booking_fee_percent: f64,
    pub booking_hold_hours: i64,
    pub max_upload_bytes: usize,
    pub sweep_interval_secs: u64,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value `{}`: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let upload_dir = lookup("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string());

        let public_base_url =
            lookup("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://{}", bind_addr));

        let packages_yaml = lookup("PACKAGES_YAML").filter(|p| !p.trim().is_empty());

        let booking_fee_percent = parse_or::<f64>(&lookup, "BOOKING_FEE_PERCENT", 5.0)?;
        if !(booking_fee_percent > 0.0 && booking_fee_percent <= 100.0) {
            anyhow::bail!("BOOKING_FEE_PERCENT must be within (0, 100]");
        }

        let booking_hold_hours = parse_or::<i64>(&lookup, "BOOKING_HOLD_HOURS", 24)?;
        if booking_hold_hours < 1 {
            anyhow::bail!("BOOKING_HOLD_HOURS must be at least 1");
        }

        let max_upload_bytes = parse_or::<usize>(&lookup, "MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?;
        let sweep_interval_secs = parse_or::<u64>(&lookup, "SWEEP_INTERVAL_SECS", 60)?.max(1);

        Ok(Self {
            database_url,
            bind_addr,
            upload_dir,
            public_base_url,
            packages_yaml,
            booking_fee_percent,
            booking_hold_hours,
            max_upload_bytes,
            sweep_interval_secs,
        })
    }

    pub fn booking_policy(&self) -> BookingPolicy {
        BookingPolicy {
            fee_percent: self.booking_fee_percent,
            hold: Duration::hours(self.booking_hold_hours),
        }
    }

    pub async fn create_app_state(&self) -> anyhow::Result<AppState> {
        AppState::new(self)
            .await
            .context("Failed to initialize AppState")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DATABASE_URL", "sqlite://market.db")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.upload_dir, "./uploads");
        assert_eq!(config.public_base_url, "http://127.0.0.1:8080");
        assert_eq!(config.packages_yaml, None);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.booking_policy(), BookingPolicy::default());
    }

    #[test]
    fn database_url_is_required() {
        assert!(config(&[]).is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        let base = ("DATABASE_URL", "sqlite://market.db");
        assert!(config(&[base, ("BOOKING_FEE_PERCENT", "lima")]).is_err());
        assert!(config(&[base, ("BOOKING_FEE_PERCENT", "0")]).is_err());
        assert!(config(&[base, ("BOOKING_HOLD_HOURS", "0")]).is_err());

        let config = config(&[base, ("BOOKING_FEE_PERCENT", "10"), ("SWEEP_INTERVAL_SECS", "0")])
            .unwrap();
        assert_eq!(config.booking_fee_percent, 10.0);
        assert_eq!(config.sweep_interval_secs, 1);
    }
}
