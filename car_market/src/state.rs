use anyhow::{Context, Result};
use common::workflow::BookingPolicy;
use common::{Database, PackageInput};

use crate::config::AppConfig;
use crate::storage::Storage;

pub struct AppState {
    pub db: Database,
    pub storage: Storage,
    pub policy: BookingPolicy,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;
        log::info!("Database initialized successfully!");

        let storage = Storage::new(
            &config.upload_dir,
            &config.public_base_url,
            config.max_upload_bytes,
        );
        storage.init().await?;

        Ok(AppState {
            db,
            storage,
            policy: config.booking_policy(),
        })
    }

    /// Seeds listing packages from the YAML file, when one is configured.
    pub async fn initialize_data_from_files(&self, packages_yaml: Option<&str>) -> Result<()> {
        let Some(path) = packages_yaml else {
            log::debug!("No PACKAGES_YAML configured, skipping package seeding");
            return Ok(());
        };

        let packages = PackageInput::from_yaml_file(path)
            .await
            .with_context(|| format!("Failed to load packages from `{}`", path))?;

        let added = self
            .db
            .seed_packages(&packages)
            .await
            .with_context(|| format!("Failed to seed packages from `{}`", path))?;
        log::info!("Seeded {} of {} listing packages", added, packages.len());
        Ok(())
    }

    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let root = std::env::temp_dir().join(format!("car-market-{}", common::random_code(8)));
        let storage = Storage::new(root, "http://localhost:8080", 1024 * 1024);
        storage.init().await.unwrap();
        AppState {
            db: Database::in_memory().await.unwrap(),
            storage,
            policy: BookingPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_packages_once() {
        let state = AppState::for_tests().await;
        let path = std::env::temp_dir().join(format!("packages-{}.yaml", common::random_code(6)));
        tokio::fs::write(
            &path,
            "- name: Gratis\n  price: 0\n  duration_days: 7\n- name: Premium\n  price: 150000\n  duration_days: 30\n  is_featured: true\n  priority_level: 3\n",
        )
        .await
        .unwrap();
        let path = path.to_string_lossy().to_string();

        state.initialize_data_from_files(Some(&path)).await.unwrap();
        state.initialize_data_from_files(Some(&path)).await.unwrap();
        state.initialize_data_from_files(None).await.unwrap();

        let packages = state
            .db
            .list_packages(&common::PackageFilter::default())
            .await
            .unwrap();
        assert_eq!(packages.len(), 2);
        assert!(state.db.get_package_by_slug("premium").await.unwrap().is_some());
    }
}
