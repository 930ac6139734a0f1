use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite};

use super::{Database, Page, Paged, like};
use crate::error::DomainError;
use crate::listing;
use crate::schema::{Car, CarFilter, CarInput, CarStatus, SellerStats};

fn push_car_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CarFilter) {
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let term = like(search);
        qb.push(" AND (c.brand LIKE ")
            .push_bind(term.clone())
            .push(" ESCAPE '\\' OR c.model LIKE ")
            .push_bind(term)
            .push(" ESCAPE '\\')");
    }
    if let Some(brand) = filter.brand.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND c.brand = ").push_bind(brand.trim().to_string());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND c.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND c.price <= ").push_bind(max);
    }
    if let Some(min) = filter.min_year {
        qb.push(" AND c.year >= ").push_bind(min);
    }
    if let Some(max) = filter.max_year {
        qb.push(" AND c.year <= ").push_bind(max);
    }
    if let Some(status) = filter.status {
        qb.push(" AND c.status = ").push_bind(status);
    }
    if let Some(seller_id) = filter.seller_id {
        qb.push(" AND c.seller_id = ").push_bind(seller_id);
    }
}

impl Database {
    pub async fn create_car(&self, seller_id: i64, input: &CarInput) -> anyhow::Result<Car> {
        let result = sqlx::query(
            r#"
            INSERT INTO cars (
                seller_id, brand, model, year, price, mileage,
                transmission, fuel_type, color, location, description, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(seller_id)
        .bind(input.brand.trim())
        .bind(input.model.trim())
        .bind(input.year)
        .bind(input.price)
        .bind(input.mileage)
        .bind(&input.transmission)
        .bind(&input.fuel_type)
        .bind(&input.color)
        .bind(&input.location)
        .bind(&input.description)
        .bind(CarStatus::Pending)
        .execute(&self.pool)
        .await
        .context("Failed to save car")?;

        self.get_car(result.last_insert_rowid())
            .await?
            .context("Saved car disappeared")
    }

    pub async fn get_car(&self, id: i64) -> anyhow::Result<Option<Car>> {
        sqlx::query_as::<_, Car>("SELECT * FROM cars WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get car with id {}", id))
    }

    /// Fetches a car for a public detail page and counts the view.
    pub async fn view_car(&self, id: i64) -> anyhow::Result<Option<Car>> {
        sqlx::query("UPDATE cars SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to count view of car {}", id))?;
        self.get_car(id).await
    }

    /// Seller edit. The listing goes back to admin review.
    pub async fn update_car(
        &self,
        id: i64,
        seller_id: i64,
        input: &CarInput,
    ) -> anyhow::Result<Car> {
        let car = self.get_car(id).await?.ok_or(DomainError::NotFound("Car"))?;
        listing::ensure_owner(&car, seller_id)?;
        listing::ensure_editable(&car)?;

        let result = sqlx::query(
            r#"
            UPDATE cars SET
                brand = ?, model = ?, year = ?, price = ?, mileage = ?,
                transmission = ?, fuel_type = ?, color = ?, location = ?, description = ?,
                status = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status NOT IN ('reserved', 'sold')
            "#,
        )
        .bind(input.brand.trim())
        .bind(input.model.trim())
        .bind(input.year)
        .bind(input.price)
        .bind(input.mileage)
        .bind(&input.transmission)
        .bind(&input.fuel_type)
        .bind(&input.color)
        .bind(&input.location)
        .bind(&input.description)
        .bind(CarStatus::Pending)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update car {}", id))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict("Car was booked while editing".into()).into());
        }
        self.get_car(id).await?.context("Updated car disappeared")
    }

    pub async fn delete_car(&self, id: i64, seller_id: i64) -> anyhow::Result<()> {
        let car = self.get_car(id).await?.ok_or(DomainError::NotFound("Car"))?;
        listing::ensure_owner(&car, seller_id)?;
        listing::ensure_deletable(&car)?;

        let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE car_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count car transactions")?;
        if history > 0 {
            return Err(DomainError::state("Listing has purchase history and cannot be deleted").into());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM listing_payments WHERE car_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete listing payments")?;
        sqlx::query("UPDATE credit_simulations SET car_id = NULL WHERE car_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to detach credit simulations")?;
        sqlx::query("DELETE FROM cars WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete car {}", id))?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_car_status(&self, id: i64, status: CarStatus) -> anyhow::Result<Car> {
        sqlx::query("UPDATE cars SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to set status of car {}", id))?;
        self.get_car(id).await?.ok_or(DomainError::NotFound("Car").into())
    }

    /// Admin approval or rejection of a pending listing.
    pub async fn review_car(&self, id: i64, approve: bool) -> anyhow::Result<Car> {
        let car = self.get_car(id).await?.ok_or(DomainError::NotFound("Car"))?;
        let status = listing::review_status(&car, approve)?;
        let result = sqlx::query(
            "UPDATE cars SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = 'pending'",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to review car {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict("Car was reviewed concurrently".into()).into());
        }
        log::info!("Car {} reviewed: {}", id, status.as_str());
        self.get_car(id).await?.context("Reviewed car disappeared")
    }

    /// Catalog search: package priority first, then freshly refreshed, then newest.
    pub async fn search_cars(&self, filter: &CarFilter, page: Page) -> anyhow::Result<Paged<Car>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM cars c WHERE 1 = 1");
        push_car_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cars")?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.* FROM cars c LEFT JOIN listing_packages p ON p.id = c.package_id WHERE 1 = 1",
        );
        push_car_filters(&mut qb, filter);
        qb.push(
            " ORDER BY COALESCE(p.priority_level, 0) DESC, \
             COALESCE(c.last_refreshed_at, c.created_at) DESC, c.id DESC LIMIT ",
        )
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());

        let cars = qb
            .build_query_as::<Car>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to search cars")?;
        Ok(Paged::new(cars, total, page))
    }

    pub async fn seller_stats(&self, seller_id: i64) -> anyhow::Result<SellerStats> {
        let rows: Vec<(CarStatus, i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(view_count), 0) FROM cars WHERE seller_id = ? GROUP BY status",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get stats of seller {}", seller_id))?;

        let mut stats = SellerStats::default();
        for (status, count, views) in rows {
            stats.total += count;
            stats.total_views += views;
            match status {
                CarStatus::Available => stats.active += count,
                CarStatus::Pending => stats.pending += count,
                CarStatus::Reserved => stats.reserved += count,
                CarStatus::Sold => stats.sold += count,
                CarStatus::Expired => stats.expired += count,
                CarStatus::Rejected => {}
            }
        }
        Ok(stats)
    }

    pub async fn refresh_car(
        &self,
        id: i64,
        seller_id: i64,
        now: NaiveDateTime,
    ) -> anyhow::Result<Car> {
        let car = self.get_car(id).await?.ok_or(DomainError::NotFound("Car"))?;
        listing::ensure_owner(&car, seller_id)?;
        let package = match car.package_id {
            Some(package_id) => self.get_package(package_id).await?,
            None => None,
        };
        listing::can_refresh(&car, package.as_ref())?;

        let result = sqlx::query(
            r#"
            UPDATE cars
            SET refresh_count = refresh_count + 1, last_refreshed_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND refresh_count = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(car.refresh_count)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to refresh car {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict("Listing was refreshed concurrently".into()).into());
        }
        self.get_car(id).await?.context("Refreshed car disappeared")
    }

    /// Moves available listings past their end date to `expired`.
    pub async fn expire_listings(&self, now: NaiveDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cars SET status = 'expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'available' AND listing_end_date IS NOT NULL AND listing_end_date < ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to expire listings")?;
        Ok(result.rows_affected())
    }
}
