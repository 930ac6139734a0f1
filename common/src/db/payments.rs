use anyhow::Context;
use sqlx::SqliteConnection;

use super::{Database, Page, Paged};
use crate::error::DomainError;
use crate::schema::{NewPayment, Payment, PaymentStatus};

/// Payment rows whose transaction reached a final status.
const SETTLED_TRANSACTION: &str = "transaction_id IN (SELECT id FROM transactions WHERE status IN ('completed', 'cancelled', 'refunded'))";

pub(super) async fn insert_payment(
    conn: &mut SqliteConnection,
    payment: &NewPayment,
) -> anyhow::Result<i64> {
    if payment.amount <= 0 {
        return Err(DomainError::invalid("Payment amount must be positive").into());
    }
    let result = sqlx::query(
        r#"
        INSERT INTO payments (
            transaction_id, payment_type, amount, payment_method, reference_code,
            bank_name, account_number, account_holder, status, proof_of_payment,
            verified_by, verified_at, notes, payment_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payment.transaction_id)
    .bind(payment.payment_type)
    .bind(payment.amount)
    .bind(&payment.payment_method)
    .bind(&payment.reference_code)
    .bind(&payment.bank_name)
    .bind(&payment.account_number)
    .bind(&payment.account_holder)
    .bind(payment.status)
    .bind(&payment.proof_of_payment)
    .bind(payment.verified_by)
    .bind(payment.verified_at)
    .bind(&payment.notes)
    .bind(payment.payment_date)
    .execute(conn)
    .await
    .with_context(|| {
        format!(
            "Failed to save payment for transaction {}",
            payment.transaction_id
        )
    })?;
    Ok(result.last_insert_rowid())
}

pub(super) async fn update_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE payments SET
            status = ?, proof_of_payment = ?, verified_by = ?, verified_at = ?,
            rejection_reason = ?, rejected_by = ?, rejected_at = ?, rejection_count = ?,
            notes = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(payment.status)
    .bind(&payment.proof_of_payment)
    .bind(payment.verified_by)
    .bind(payment.verified_at)
    .bind(&payment.rejection_reason)
    .bind(payment.rejected_by)
    .bind(payment.rejected_at)
    .bind(payment.rejection_count)
    .bind(&payment.notes)
    .bind(payment.id)
    .execute(conn)
    .await
    .with_context(|| format!("Failed to update payment {}", payment.id))?;
    Ok(())
}

impl Database {
    pub async fn get_payment(&self, id: i64) -> anyhow::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get payment {}", id))
    }

    pub async fn get_payment_by_reference(
        &self,
        reference_code: &str,
    ) -> anyhow::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE reference_code = ?")
            .bind(reference_code)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get payment `{}`", reference_code))
    }

    /// Newest first.
    pub async fn payments_for_transaction(
        &self,
        transaction_id: i64,
    ) -> anyhow::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE transaction_id = ? ORDER BY id DESC",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get payments of transaction {}", transaction_id))
    }

    pub async fn payments_by_status(&self, status: PaymentStatus) -> anyhow::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE status = ? ORDER BY id DESC")
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .context("Failed to get payments by status")
    }

    pub async fn list_payments(&self, page: Page) -> anyhow::Result<Paged<Payment>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count payments")?;
        let items = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list payments")?;
        Ok(Paged::new(items, total, page))
    }

    /// Transfers with a proof that an admin has not decided on yet.
    pub async fn payments_needing_verification(&self) -> anyhow::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status IN ('uploaded', 'processing')
              AND proof_of_payment IS NOT NULL AND TRIM(proof_of_payment) != ''
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get payments needing verification")
    }

    /// Most recent rejection first.
    pub async fn rejected_payments(&self) -> anyhow::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE status = 'rejected' ORDER BY rejected_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get rejected payments")
    }

    /// Admin correction of a payment status outside the purchase flow. Only
    /// payments of settled transactions can be touched; live ones move through
    /// the workflow.
    pub async fn update_payment_status(
        &self,
        id: i64,
        status: PaymentStatus,
    ) -> anyhow::Result<Payment> {
        let result = sqlx::query(&format!(
            "UPDATE payments SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND {}",
            SETTLED_TRANSACTION
        ))
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set status of payment {}", id))?;
        if result.rows_affected() == 0 {
            return Err(self.untouchable(id).await);
        }
        self.get_payment(id).await?.context("Updated payment disappeared")
    }

    pub async fn delete_payment(&self, id: i64) -> anyhow::Result<()> {
        let result = sqlx::query(&format!(
            "DELETE FROM payments WHERE id = ? AND {}",
            SETTLED_TRANSACTION
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to delete payment {}", id))?;
        if result.rows_affected() == 0 {
            return Err(self.untouchable(id).await);
        }
        Ok(())
    }

    /// Why a manual write matched no payment row.
    async fn untouchable(&self, id: i64) -> anyhow::Error {
        match self.get_payment(id).await {
            Ok(Some(_)) => DomainError::Conflict(format!(
                "Payment {} belongs to a transaction still in progress",
                id
            ))
            .into(),
            Ok(None) => DomainError::NotFound("Payment").into(),
            Err(e) => e,
        }
    }
}
