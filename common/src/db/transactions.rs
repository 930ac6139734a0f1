use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use super::payments::{insert_payment, update_payment};
use super::{Database, Page, Paged, like};
use crate::error::{DomainError, DomainResult};
use crate::helpers::invoice_number;
use crate::schema::{CarStatus, NewTransaction, Transaction, TransactionFilter};
use crate::workflow::{self, Transition, TransactionView};

/// Outcome of one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub bookings_expired: u64,
    pub listings_expired: u64,
    pub articles_published: u64,
    pub conflicts: u64,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn push_transaction_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &TransactionFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(booking_status) = filter.booking_status {
        qb.push(" AND booking_status = ").push_bind(booking_status);
    }
    if let Some(payment_status) = filter.payment_status {
        qb.push(" AND payment_status = ").push_bind(payment_status);
    }
    if let Some(buyer_id) = filter.buyer_id {
        qb.push(" AND buyer_id = ").push_bind(buyer_id);
    }
    if let Some(seller_id) = filter.seller_id {
        qb.push(" AND seller_id = ").push_bind(seller_id);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND invoice_number LIKE ")
            .push_bind(like(search))
            .push(" ESCAPE '\\'");
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

impl Database {
    /// Writes a booking and reserves its car in one transaction.
    pub async fn insert_booking(&self, booking: &NewTransaction) -> anyhow::Result<TransactionView> {
        let mut tx = self.pool.begin().await?;
        let reserved = sqlx::query(
            "UPDATE cars SET status = 'reserved', updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = 'available'",
        )
        .bind(booking.car_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to reserve car {}", booking.car_id))?;
        if reserved.rows_affected() == 0 {
            return Err(DomainError::Conflict("Car is no longer available".into()).into());
        }

        let mut invoice = booking.invoice_number.clone();
        let mut attempt = 0;
        let id = loop {
            let inserted = sqlx::query(
                r#"
                INSERT INTO transactions (
                    invoice_number, buyer_id, seller_id, car_id, car_price, booking_fee,
                    total_amount, payment_method, booking_expires_at, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&invoice)
            .bind(booking.buyer_id)
            .bind(booking.seller_id)
            .bind(booking.car_id)
            .bind(booking.car_price)
            .bind(booking.booking_fee)
            .bind(booking.total_amount)
            .bind(&booking.payment_method)
            .bind(booking.booking_expires_at)
            .bind(&booking.notes)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(result) => break result.last_insert_rowid(),
                Err(err) if attempt == 0 && is_unique_violation(&err) => {
                    log::warn!("Invoice number {} already taken, regenerating", invoice);
                    attempt += 1;
                    invoice = invoice_number(Utc::now().naive_utc());
                }
                Err(err) => return Err(err).context("Failed to save booking"),
            }
        };
        tx.commit().await?;

        log::info!(
            "Booking {} created: car {} reserved for buyer {}",
            invoice,
            booking.car_id,
            booking.buyer_id
        );
        self.get_transaction_view(id)
            .await?
            .context("Saved booking disappeared")
    }

    pub async fn get_transaction(&self, id: i64) -> anyhow::Result<Option<Transaction>> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get transaction {}", id))
    }

    pub async fn get_transaction_view(&self, id: i64) -> anyhow::Result<Option<TransactionView>> {
        let Some(transaction) = self.get_transaction(id).await? else {
            return Ok(None);
        };
        let payments = self.payments_for_transaction(id).await?;
        Ok(Some(TransactionView::new(transaction, payments)))
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
    ) -> anyhow::Result<Paged<TransactionView>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM transactions WHERE 1 = 1");
        push_transaction_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM transactions WHERE 1 = 1");
        push_transaction_filters(&mut qb, filter);
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let transactions = qb
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        let mut views = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let payments = self.payments_for_transaction(transaction.id).await?;
            views.push(TransactionView::new(transaction, payments));
        }
        Ok(Paged::new(views, total, page))
    }

    /// Writes a transition atomically. Fails with a conflict when the
    /// transaction changed since it was read.
    pub async fn apply_transition(&self, transition: &Transition) -> anyhow::Result<TransactionView> {
        let t = &transition.transaction;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE transactions SET
                payment_method = ?, payment_status = ?, status = ?, booking_status = ?,
                booking_expires_at = ?, confirmed_at = ?, booking_rejected_at = ?,
                final_payment_method = ?, final_payment_completed_at = ?,
                handover_at = ?, handover_photo = ?, handover_notes = ?,
                cancelled_at = ?, cancellation_reason = ?,
                refunded_at = ?, refund_amount = ?, refund_proof = ?, notes = ?,
                version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&t.payment_method)
        .bind(t.payment_status)
        .bind(t.status)
        .bind(t.booking_status)
        .bind(t.booking_expires_at)
        .bind(t.confirmed_at)
        .bind(t.booking_rejected_at)
        .bind(t.final_payment_method)
        .bind(t.final_payment_completed_at)
        .bind(t.handover_at)
        .bind(&t.handover_photo)
        .bind(&t.handover_notes)
        .bind(t.cancelled_at)
        .bind(&t.cancellation_reason)
        .bind(t.refunded_at)
        .bind(t.refund_amount)
        .bind(&t.refund_proof)
        .bind(&t.notes)
        .bind(t.id)
        .bind(t.version)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to update transaction {}", t.id))?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::Conflict(format!(
                "Transaction {} was changed by someone else, reload and try again",
                t.invoice_number
            ))
            .into());
        }

        for payment in &transition.payment_updates {
            update_payment(&mut tx, payment).await?;
        }
        if let Some(new_payment) = &transition.new_payment {
            insert_payment(&mut tx, new_payment).await?;
        }

        if let Some(change) = transition.car_change {
            let moved = sqlx::query(
                "UPDATE cars SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = ?",
            )
            .bind(change.to)
            .bind(change.car_id)
            .bind(change.from)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update car {}", change.car_id))?;
            if moved.rows_affected() == 0 {
                if change.to == CarStatus::Sold {
                    return Err(DomainError::Conflict(format!(
                        "Car {} is not reserved anymore",
                        change.car_id
                    ))
                    .into());
                }
                log::warn!(
                    "Car {} was not {} when releasing it, left unchanged",
                    change.car_id,
                    change.from.as_str()
                );
            }
        }
        tx.commit().await?;

        self.get_transaction_view(t.id)
            .await?
            .context("Updated transaction disappeared")
    }

    /// Loads a transaction, runs `step` on it and writes the result.
    pub async fn run_transition<F>(&self, id: i64, step: F) -> anyhow::Result<TransactionView>
    where
        F: FnOnce(&TransactionView) -> DomainResult<Transition>,
    {
        let view = self
            .get_transaction_view(id)
            .await?
            .ok_or(DomainError::NotFound("Transaction"))?;
        let transition = step(&view)?;
        self.apply_transition(&transition).await
    }

    /// Expires overdue bookings and listings.
    pub async fn sweep(&self, now: NaiveDateTime) -> anyhow::Result<SweepReport> {
        let overdue: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM transactions
            WHERE status = 'pending'
              AND booking_status IN ('booking_pending', 'booking_rejected')
              AND booking_expires_at IS NOT NULL AND booking_expires_at < ?
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find overdue bookings")?;

        let mut report = SweepReport::default();
        for id in overdue {
            match self
                .run_transition(id, |view| workflow::expire_booking(view, now))
                .await
            {
                Ok(view) => {
                    log::info!(
                        "Booking {} expired, car {} released",
                        view.transaction.invoice_number,
                        view.transaction.car_id
                    );
                    report.bookings_expired += 1;
                }
                Err(err) if err.downcast_ref::<DomainError>().is_some() => {
                    log::debug!("Skipping booking {}: {}", id, err);
                    report.conflicts += 1;
                }
                Err(err) => return Err(err),
            }
        }

        report.listings_expired = self.expire_listings(now).await?;
        report.articles_published = self.publish_scheduled(now).await?;
        Ok(report)
    }
}
