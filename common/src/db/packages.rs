use std::collections::HashSet;

use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite};

use super::{Database, like};
use crate::error::DomainError;
use crate::helpers::{reference_code, unique_slug};
use crate::listing;
use crate::schema::{
    ListingPackage, ListingPayment, ListingPaymentStatus, PackageFilter, PackageInput,
    PackageSort, PackageStats, SortOrder,
};

impl PackageSort {
    fn column(&self) -> &'static str {
        match self {
            PackageSort::Name => "name",
            PackageSort::Price => "price",
            PackageSort::DurationDays => "duration_days",
            PackageSort::DisplayOrder => "display_order",
            PackageSort::CreatedAt => "created_at",
        }
    }
}

impl Database {
    /// First free slug among `base`, `base-1`, `base-2`, ... ignoring `own_id`.
    async fn free_package_slug(&self, base: &str, own_id: Option<i64>) -> anyhow::Result<String> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, slug FROM listing_packages WHERE slug LIKE ?")
                .bind(format!("{}%", base))
                .fetch_all(&self.pool)
                .await
                .context("Failed to look up package slugs")?;
        let taken: HashSet<String> = rows
            .into_iter()
            .filter(|(id, _)| Some(*id) != own_id)
            .map(|(_, slug)| slug)
            .collect();
        Ok(unique_slug(base, |candidate| taken.contains(candidate)))
    }

    pub async fn create_package(&self, input: &PackageInput) -> anyhow::Result<ListingPackage> {
        let base = listing::validate_package(input)?;
        let slug = self.free_package_slug(&base, None).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO listing_packages (
                name, slug, description, price, duration_days, max_photos,
                is_featured, is_highlighted, priority_level, allows_refresh, refresh_count,
                allows_badge, badge_text, is_active, display_order
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.duration_days)
        .bind(input.max_photos)
        .bind(input.is_featured)
        .bind(input.is_highlighted)
        .bind(input.priority_level)
        .bind(input.allows_refresh)
        .bind(input.refresh_count)
        .bind(input.allows_badge)
        .bind(&input.badge_text)
        .bind(input.is_active)
        .bind(input.display_order)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save package `{}`", input.name))?;

        self.get_package(result.last_insert_rowid())
            .await?
            .context("Saved package disappeared")
    }

    pub async fn update_package(
        &self,
        id: i64,
        input: &PackageInput,
    ) -> anyhow::Result<ListingPackage> {
        self.get_package(id)
            .await?
            .ok_or(DomainError::NotFound("Package"))?;
        let base = listing::validate_package(input)?;
        let slug = self.free_package_slug(&base, Some(id)).await?;

        sqlx::query(
            r#"
            UPDATE listing_packages SET
                name = ?, slug = ?, description = ?, price = ?, duration_days = ?, max_photos = ?,
                is_featured = ?, is_highlighted = ?, priority_level = ?, allows_refresh = ?,
                refresh_count = ?, allows_badge = ?, badge_text = ?, is_active = ?,
                display_order = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.duration_days)
        .bind(input.max_photos)
        .bind(input.is_featured)
        .bind(input.is_highlighted)
        .bind(input.priority_level)
        .bind(input.allows_refresh)
        .bind(input.refresh_count)
        .bind(input.allows_badge)
        .bind(&input.badge_text)
        .bind(input.is_active)
        .bind(input.display_order)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update package {}", id))?;

        self.get_package(id)
            .await?
            .context("Updated package disappeared")
    }

    /// Inserts seed packages whose slug is not present yet. Returns how many
    /// were added.
    pub async fn seed_packages(&self, packages: &[PackageInput]) -> anyhow::Result<usize> {
        let mut added = 0;
        for input in packages {
            let slug = listing::validate_package(input)
                .with_context(|| format!("Invalid seed package `{}`", input.name))?;
            if self.get_package_by_slug(&slug).await?.is_some() {
                log::debug!("Package `{}` already present, skipping", slug);
                continue;
            }
            self.create_package(input).await?;
            added += 1;
        }
        Ok(added)
    }

    pub async fn get_package(&self, id: i64) -> anyhow::Result<Option<ListingPackage>> {
        sqlx::query_as::<_, ListingPackage>("SELECT * FROM listing_packages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get package with id {}", id))
    }

    pub async fn get_package_by_slug(&self, slug: &str) -> anyhow::Result<Option<ListingPackage>> {
        sqlx::query_as::<_, ListingPackage>("SELECT * FROM listing_packages WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get package `{}`", slug))
    }

    pub async fn list_packages(&self, filter: &PackageFilter) -> anyhow::Result<Vec<ListingPackage>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM listing_packages WHERE 1 = 1");
        if let Some(active) = filter.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        if let Some(featured) = filter.is_featured {
            qb.push(" AND is_featured = ").push_bind(featured);
        }
        if let Some(highlighted) = filter.is_highlighted {
            qb.push(" AND is_highlighted = ").push_bind(highlighted);
        }
        if let Some(min) = filter.min_price {
            qb.push(" AND price >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price {
            qb.push(" AND price <= ").push_bind(max);
        }
        if let Some(min) = filter.min_duration {
            qb.push(" AND duration_days >= ").push_bind(min);
        }
        if let Some(max) = filter.max_duration {
            qb.push(" AND duration_days <= ").push_bind(max);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let term = like(search);
            qb.push(" AND (name LIKE ")
                .push_bind(term.clone())
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(term)
                .push(" ESCAPE '\\')");
        }
        let column = filter.sort_by.unwrap_or(PackageSort::DisplayOrder).column();
        let order = match filter.sort_order.unwrap_or(SortOrder::Asc) {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(format!(" ORDER BY {} {}, id ASC", column, order));

        qb.build_query_as::<ListingPackage>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list packages")
    }

    pub async fn toggle_package_active(&self, id: i64) -> anyhow::Result<ListingPackage> {
        let result = sqlx::query(
            "UPDATE listing_packages SET is_active = NOT is_active, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to toggle package {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Package").into());
        }
        self.get_package(id).await?.context("Toggled package disappeared")
    }

    /// Refused while a live or pending listing uses the package.
    pub async fn delete_package(&self, id: i64) -> anyhow::Result<()> {
        let in_use: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cars WHERE package_id = ? AND status IN ('available', 'pending')",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check package usage")?;
        if in_use > 0 {
            return Err(DomainError::state(format!(
                "Package is used by {} active listing(s)",
                in_use
            ))
            .into());
        }
        let history: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM listing_payments WHERE package_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check package payments")?;
        if history > 0 {
            return Err(DomainError::state(
                "Package has payment history; deactivate it instead",
            )
            .into());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE cars SET package_id = NULL WHERE package_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to detach package from cars")?;
        let result = sqlx::query("DELETE FROM listing_packages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete package {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Package").into());
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn package_stats(&self) -> anyhow::Result<PackageStats> {
        let (total_packages, active_packages, featured_packages, average_price): (
            i64,
            i64,
            i64,
            f64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_active THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_featured THEN 1 ELSE 0 END), 0),
                COALESCE(AVG(CAST(price AS REAL)), 0.0)
            FROM listing_packages
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute package counts")?;

        let total_revenue: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM listing_payments WHERE payment_status = 'success'",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute listing revenue")?;

        let active_listings: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cars WHERE package_id IS NOT NULL AND status = 'available'",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count active listings")?;

        let most_popular_package: Option<String> = sqlx::query_scalar(
            r#"
            SELECT p.name FROM listing_payments lp
            JOIN listing_packages p ON p.id = lp.package_id
            WHERE lp.payment_status = 'success'
            GROUP BY p.id ORDER BY COUNT(*) DESC, p.id ASC LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find most popular package")?;

        Ok(PackageStats {
            total_packages,
            active_packages,
            featured_packages,
            average_price,
            most_popular_package,
            total_revenue,
            active_listings,
        })
    }

    /// Seller buys a package for one of their cars. Free packages activate
    /// immediately.
    pub async fn create_listing_payment(
        &self,
        seller_id: i64,
        car_id: i64,
        package_id: i64,
        payment_method: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<ListingPayment> {
        let car = self
            .get_car(car_id)
            .await?
            .ok_or(DomainError::NotFound("Car"))?;
        listing::ensure_owner(&car, seller_id)?;
        listing::ensure_editable(&car)?;
        let package = self
            .get_package(package_id)
            .await?
            .ok_or(DomainError::NotFound("Package"))?;
        if !package.is_active {
            return Err(DomainError::state("Package is not available").into());
        }

        let status = if package.price == 0 {
            ListingPaymentStatus::Success
        } else {
            ListingPaymentStatus::Pending
        };
        let result = sqlx::query(
            r#"
            INSERT INTO listing_payments (
                car_id, seller_id, package_id, amount, payment_method, payment_status, reference_code
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(car_id)
        .bind(seller_id)
        .bind(package_id)
        .bind(package.price)
        .bind(payment_method)
        .bind(ListingPaymentStatus::Pending)
        .bind(reference_code("LP", now))
        .execute(&self.pool)
        .await
        .context("Failed to save listing payment")?;
        let id = result.last_insert_rowid();

        if status == ListingPaymentStatus::Success {
            return self.verify_listing_payment(id, seller_id, true, now).await;
        }
        self.get_listing_payment(id)
            .await?
            .context("Saved listing payment disappeared")
    }

    pub async fn get_listing_payment(&self, id: i64) -> anyhow::Result<Option<ListingPayment>> {
        sqlx::query_as::<_, ListingPayment>("SELECT * FROM listing_payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get listing payment {}", id))
    }

    pub async fn list_listing_payments(
        &self,
        seller_id: Option<i64>,
        status: Option<ListingPaymentStatus>,
    ) -> anyhow::Result<Vec<ListingPayment>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM listing_payments WHERE 1 = 1");
        if let Some(seller_id) = seller_id {
            qb.push(" AND seller_id = ").push_bind(seller_id);
        }
        if let Some(status) = status {
            qb.push(" AND payment_status = ").push_bind(status);
        }
        qb.push(" ORDER BY id DESC");
        qb.build_query_as::<ListingPayment>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list listing payments")
    }

    pub async fn upload_listing_proof(
        &self,
        id: i64,
        seller_id: i64,
        proof: &str,
    ) -> anyhow::Result<ListingPayment> {
        let payment = self
            .get_listing_payment(id)
            .await?
            .ok_or(DomainError::NotFound("Listing payment"))?;
        if payment.seller_id != seller_id {
            return Err(DomainError::forbidden("Not your listing payment").into());
        }
        let result = sqlx::query(
            r#"
            UPDATE listing_payments
            SET proof_of_payment = ?, payment_status = 'processing', updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND payment_status IN ('pending', 'processing', 'failed')
            "#,
        )
        .bind(proof)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to attach proof to listing payment {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::state("Listing payment is already settled").into());
        }
        self.get_listing_payment(id)
            .await?
            .context("Updated listing payment disappeared")
    }

    /// Settles a listing payment. Success activates the package on the car
    /// and sends the listing to admin review.
    pub async fn verify_listing_payment(
        &self,
        id: i64,
        verified_by: i64,
        approve: bool,
        now: NaiveDateTime,
    ) -> anyhow::Result<ListingPayment> {
        let payment = self
            .get_listing_payment(id)
            .await?
            .ok_or(DomainError::NotFound("Listing payment"))?;
        if !matches!(
            payment.payment_status,
            ListingPaymentStatus::Pending | ListingPaymentStatus::Processing
        ) {
            return Err(DomainError::state("Listing payment is already settled").into());
        }

        let package = self
            .get_package(payment.package_id)
            .await?
            .ok_or(DomainError::NotFound("Package"))?;

        let mut tx = self.pool.begin().await?;
        if approve {
            let (start, end) = listing::activation_window(&package, now);
            sqlx::query(
                r#"
                UPDATE listing_payments SET
                    payment_status = 'success', verified_by = ?, verified_at = ?,
                    activated_at = ?, expires_at = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(verified_by)
            .bind(now)
            .bind(start)
            .bind(end)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to approve listing payment")?;
            sqlx::query(
                r#"
                UPDATE cars SET
                    package_id = ?, listing_start_date = ?, listing_end_date = ?, refresh_count = 0,
                    status = CASE WHEN status IN ('reserved', 'sold') THEN status ELSE 'pending' END,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(package.id)
            .bind(start)
            .bind(end)
            .bind(payment.car_id)
            .execute(&mut *tx)
            .await
            .context("Failed to activate listing")?;
            log::info!(
                "Package `{}` activated for car {} until {}",
                package.slug,
                payment.car_id,
                end
            );
        } else {
            sqlx::query(
                r#"
                UPDATE listing_payments SET
                    payment_status = 'failed', verified_by = ?, verified_at = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(verified_by)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to reject listing payment")?;
        }
        tx.commit().await?;

        self.get_listing_payment(id)
            .await?
            .context("Verified listing payment disappeared")
    }
}
