use anyhow::Context;

use super::Database;
use crate::error::DomainError;
use crate::helpers::non_blank;
use crate::listing;
use crate::schema::{Car, CarImage, CarImageInput};

impl Database {
    /// Photos of a car, primary first.
    pub async fn car_images(&self, car_id: i64) -> anyhow::Result<Vec<CarImage>> {
        sqlx::query_as::<_, CarImage>(
            "SELECT * FROM car_images WHERE car_id = ? ORDER BY is_primary DESC, display_order, id",
        )
        .bind(car_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get photos of car {}", car_id))
    }

    pub async fn get_car_image(&self, id: i64) -> anyhow::Result<Option<CarImage>> {
        sqlx::query_as::<_, CarImage>("SELECT * FROM car_images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get car photo {}", id))
    }

    async fn editable_car(&self, car_id: i64, seller_id: i64) -> anyhow::Result<Car> {
        let car = self.get_car(car_id).await?.ok_or(DomainError::NotFound("Car"))?;
        listing::ensure_owner(&car, seller_id)?;
        listing::ensure_editable(&car)?;
        Ok(car)
    }

    /// Attaches an uploaded photo to the seller's listing, within the photo
    /// limit of its package.
    pub async fn add_car_image(
        &self,
        car_id: i64,
        seller_id: i64,
        input: &CarImageInput,
    ) -> anyhow::Result<CarImage> {
        let car = self.editable_car(car_id, seller_id).await?;
        let image_url = input.image.trim();
        if image_url.is_empty() {
            return Err(DomainError::invalid("Image is required").into());
        }
        let package = match car.package_id {
            Some(id) => self.get_package(id).await?,
            None => None,
        };
        let limit = listing::photo_limit(&car, package.as_ref());

        // count and insert in one statement so parallel uploads cannot overshoot
        let result = sqlx::query(
            r#"
            INSERT INTO car_images (car_id, image_url, caption, is_primary, display_order)
            SELECT ?, ?, ?,
                NOT EXISTS (SELECT 1 FROM car_images WHERE car_id = ?),
                COALESCE((SELECT MAX(display_order) + 1 FROM car_images WHERE car_id = ?), 0)
            WHERE (SELECT COUNT(*) FROM car_images WHERE car_id = ?) < ?
            "#,
        )
        .bind(car_id)
        .bind(image_url)
        .bind(non_blank(input.caption.clone()))
        .bind(car_id)
        .bind(car_id)
        .bind(car_id)
        .bind(limit.unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add photo to car {}", car_id))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::state(format!(
                "Listing already has the maximum of {} photos",
                limit.unwrap_or_default()
            ))
            .into());
        }
        self.get_car_image(result.last_insert_rowid())
            .await?
            .context("Saved photo disappeared")
    }

    pub async fn set_primary_car_image(
        &self,
        car_id: i64,
        image_id: i64,
        seller_id: i64,
    ) -> anyhow::Result<Vec<CarImage>> {
        self.editable_car(car_id, seller_id).await?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE car_images SET is_primary = (id = ?) WHERE car_id = ? AND EXISTS \
             (SELECT 1 FROM car_images WHERE id = ? AND car_id = ?)",
        )
        .bind(image_id)
        .bind(car_id)
        .bind(image_id)
        .bind(car_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to set primary photo of car {}", car_id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Car photo").into());
        }
        tx.commit().await?;
        self.car_images(car_id).await
    }

    /// Removes a photo and returns it so the stored file can go too. The next
    /// photo in line takes over as primary.
    pub async fn delete_car_image(
        &self,
        car_id: i64,
        image_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> anyhow::Result<CarImage> {
        if is_admin {
            self.get_car(car_id).await?.ok_or(DomainError::NotFound("Car"))?;
        } else {
            self.editable_car(car_id, user_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        let image = sqlx::query_as::<_, CarImage>(
            "SELECT * FROM car_images WHERE id = ? AND car_id = ?",
        )
        .bind(image_id)
        .bind(car_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("Failed to get car photo {}", image_id))?
        .ok_or(DomainError::NotFound("Car photo"))?;

        sqlx::query("DELETE FROM car_images WHERE id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete car photo {}", image_id))?;
        if image.is_primary {
            sqlx::query(
                "UPDATE car_images SET is_primary = 1 WHERE id = \
                 (SELECT id FROM car_images WHERE car_id = ? ORDER BY display_order, id LIMIT 1)",
            )
            .bind(car_id)
            .execute(&mut *tx)
            .await
            .context("Failed to pick the next primary photo")?;
        }
        tx.commit().await?;
        Ok(image)
    }
}
