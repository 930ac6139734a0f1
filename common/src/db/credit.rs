use anyhow::Context;

use super::Database;
use crate::credit::{self, rounded};
use crate::error::DomainError;
use crate::schema::{
    CreditParameter, CreditParameterInput, CreditSimulation, SimulationResult, SimulationStats,
};

impl Database {
    pub async fn create_credit_parameter(
        &self,
        input: &CreditParameterInput,
    ) -> anyhow::Result<CreditParameter> {
        credit::validate_parameter(input)?;
        let result = sqlx::query(
            r#"
            INSERT INTO credit_parameters (
                partner_name, name, min_dp_percentage, max_dp_percentage, tenor_months,
                interest_rate_yearly, interest_type, admin_fee, provision_fee_percentage,
                fidusia_fee, insurance_tlo_percentage, insurance_allrisk_percentage,
                life_insurance_percentage, min_otr, max_otr, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.partner_name.trim())
        .bind(input.name.trim())
        .bind(input.min_dp_percentage)
        .bind(input.max_dp_percentage)
        .bind(input.tenor_months)
        .bind(input.interest_rate_yearly)
        .bind(input.interest_type)
        .bind(input.admin_fee)
        .bind(input.provision_fee_percentage)
        .bind(input.fidusia_fee)
        .bind(input.insurance_tlo_percentage)
        .bind(input.insurance_allrisk_percentage)
        .bind(input.life_insurance_percentage)
        .bind(input.min_otr)
        .bind(input.max_otr)
        .bind(input.is_active)
        .execute(&self.pool)
        .await
        .context("Failed to save credit parameter")?;

        self.get_credit_parameter(result.last_insert_rowid())
            .await?
            .context("Saved credit parameter disappeared")
    }

    pub async fn update_credit_parameter(
        &self,
        id: i64,
        input: &CreditParameterInput,
    ) -> anyhow::Result<CreditParameter> {
        credit::validate_parameter(input)?;
        let result = sqlx::query(
            r#"
            UPDATE credit_parameters SET
                partner_name = ?, name = ?, min_dp_percentage = ?, max_dp_percentage = ?,
                tenor_months = ?, interest_rate_yearly = ?, interest_type = ?, admin_fee = ?,
                provision_fee_percentage = ?, fidusia_fee = ?, insurance_tlo_percentage = ?,
                insurance_allrisk_percentage = ?, life_insurance_percentage = ?,
                min_otr = ?, max_otr = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(input.partner_name.trim())
        .bind(input.name.trim())
        .bind(input.min_dp_percentage)
        .bind(input.max_dp_percentage)
        .bind(input.tenor_months)
        .bind(input.interest_rate_yearly)
        .bind(input.interest_type)
        .bind(input.admin_fee)
        .bind(input.provision_fee_percentage)
        .bind(input.fidusia_fee)
        .bind(input.insurance_tlo_percentage)
        .bind(input.insurance_allrisk_percentage)
        .bind(input.life_insurance_percentage)
        .bind(input.min_otr)
        .bind(input.max_otr)
        .bind(input.is_active)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update credit parameter {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Credit parameter").into());
        }
        self.get_credit_parameter(id)
            .await?
            .context("Updated credit parameter disappeared")
    }

    pub async fn get_credit_parameter(&self, id: i64) -> anyhow::Result<Option<CreditParameter>> {
        sqlx::query_as::<_, CreditParameter>("SELECT * FROM credit_parameters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get credit parameter {}", id))
    }

    pub async fn list_credit_parameters(
        &self,
        active_only: bool,
    ) -> anyhow::Result<Vec<CreditParameter>> {
        let sql = if active_only {
            "SELECT * FROM credit_parameters WHERE is_active ORDER BY partner_name, tenor_months"
        } else {
            "SELECT * FROM credit_parameters ORDER BY partner_name, tenor_months"
        };
        sqlx::query_as::<_, CreditParameter>(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list credit parameters")
    }

    pub async fn delete_credit_parameter(&self, id: i64) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE credit_simulations SET credit_parameter_id = NULL WHERE credit_parameter_id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach simulations from credit parameter")?;
        let result = sqlx::query("DELETE FROM credit_parameters WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete credit parameter {}", id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound("Credit parameter").into());
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn save_simulation(
        &self,
        user_id: i64,
        car_id: Option<i64>,
        parameter: &CreditParameter,
        result: &SimulationResult,
        notes: Option<String>,
    ) -> anyhow::Result<CreditSimulation> {
        if let Some(car_id) = car_id {
            self.get_car(car_id).await?.ok_or(DomainError::NotFound("Car"))?;
        }
        let inserted = sqlx::query(
            r#"
            INSERT INTO credit_simulations (
                user_id, car_id, credit_parameter_id, partner_name, otr_price, down_payment,
                down_payment_percentage, loan_amount, tenor_months, interest_rate_yearly,
                interest_type, monthly_installment, total_interest, admin_fee, provision_fee,
                fidusia_fee, life_insurance, vehicle_insurance_type, vehicle_insurance_yearly,
                vehicle_insurance_total, total_initial_payment, total_payment, is_saved, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(car_id)
        .bind(parameter.id)
        .bind(&parameter.partner_name)
        .bind(rounded(result.otr_price))
        .bind(rounded(result.down_payment))
        .bind(result.down_payment_percentage)
        .bind(rounded(result.loan_amount))
        .bind(result.tenor_months)
        .bind(result.interest_rate_yearly)
        .bind(result.interest_type)
        .bind(rounded(result.monthly_installment))
        .bind(rounded(result.total_interest))
        .bind(rounded(result.admin_fee))
        .bind(rounded(result.provision_fee))
        .bind(rounded(result.fidusia_fee))
        .bind(rounded(result.life_insurance))
        .bind(result.vehicle_insurance_type)
        .bind(rounded(result.vehicle_insurance_yearly))
        .bind(rounded(result.vehicle_insurance_total))
        .bind(rounded(result.total_initial_payment))
        .bind(rounded(result.total_payment))
        .bind(true)
        .bind(notes)
        .execute(&self.pool)
        .await
        .context("Failed to save credit simulation")?;

        self.get_simulation(inserted.last_insert_rowid())
            .await?
            .context("Saved simulation disappeared")
    }

    pub async fn get_simulation(&self, id: i64) -> anyhow::Result<Option<CreditSimulation>> {
        sqlx::query_as::<_, CreditSimulation>("SELECT * FROM credit_simulations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get simulation {}", id))
    }

    pub async fn user_simulations(
        &self,
        user_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<CreditSimulation>> {
        sqlx::query_as::<_, CreditSimulation>(
            "SELECT * FROM credit_simulations WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list simulations of user {}", user_id))
    }

    async fn own_simulation(&self, id: i64, user_id: i64) -> anyhow::Result<CreditSimulation> {
        let simulation = self
            .get_simulation(id)
            .await?
            .ok_or(DomainError::NotFound("Simulation"))?;
        if simulation.user_id != user_id {
            return Err(DomainError::forbidden("Not your simulation").into());
        }
        Ok(simulation)
    }

    pub async fn toggle_simulation_saved(
        &self,
        id: i64,
        user_id: i64,
    ) -> anyhow::Result<CreditSimulation> {
        self.own_simulation(id, user_id).await?;
        sqlx::query(
            "UPDATE credit_simulations SET is_saved = NOT is_saved, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to toggle simulation {}", id))?;
        self.get_simulation(id)
            .await?
            .context("Toggled simulation disappeared")
    }

    pub async fn delete_simulation(&self, id: i64, user_id: i64) -> anyhow::Result<()> {
        self.own_simulation(id, user_id).await?;
        sqlx::query("DELETE FROM credit_simulations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete simulation {}", id))?;
        Ok(())
    }

    pub async fn simulation_stats(&self, user_id: i64) -> anyhow::Result<SimulationStats> {
        let simulations = sqlx::query_as::<_, CreditSimulation>(
            "SELECT * FROM credit_simulations WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load simulations of user {}", user_id))?;

        let (avg_monthly_payment, most_common_partner) = credit::summarize(&simulations);
        Ok(SimulationStats {
            total_simulations: simulations.len() as i64,
            saved_simulations: simulations.iter().filter(|s| s.is_saved).count() as i64,
            avg_monthly_payment,
            most_common_partner,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::credit::simulate;
    use crate::db::test_support::*;
    use crate::error::DomainError;
    use crate::schema::{CreditParameterInput, InsuranceType, InterestType};

    fn input() -> CreditParameterInput {
        CreditParameterInput {
            partner_name: "Mandiri Tunas".into(),
            name: "Reguler 24".into(),
            min_dp_percentage: 20.0,
            max_dp_percentage: 60.0,
            tenor_months: 24,
            interest_rate_yearly: 5.5,
            interest_type: InterestType::Flat,
            admin_fee: 2_000_000,
            provision_fee_percentage: 1.0,
            fidusia_fee: 300_000,
            insurance_tlo_percentage: 0.4,
            insurance_allrisk_percentage: 2.0,
            life_insurance_percentage: 0.5,
            min_otr: None,
            max_otr: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn parameters_crud() {
        let db = db().await;
        let p = db.create_credit_parameter(&input()).await.unwrap();
        assert_eq!(p.interest_type, InterestType::Flat);

        let mut changed = input();
        changed.is_active = false;
        db.update_credit_parameter(p.id, &changed).await.unwrap();
        assert!(db.list_credit_parameters(true).await.unwrap().is_empty());
        assert_eq!(db.list_credit_parameters(false).await.unwrap().len(), 1);

        let mut bad = input();
        bad.tenor_months = 0;
        let err = db.create_credit_parameter(&bad).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DomainError>(),
            Some(DomainError::Invalid(_))
        ));

        db.delete_credit_parameter(p.id).await.unwrap();
        assert!(db.delete_credit_parameter(p.id).await.is_err());
    }

    #[tokio::test]
    async fn simulations_belong_to_their_user() {
        let db = db().await;
        let owner = user(&db, "owner", false).await;
        let other = user(&db, "other", false).await;
        let p = db.create_credit_parameter(&input()).await.unwrap();
        let result = simulate(&p, 150_000_000.0, 45_000_000.0, InsuranceType::Allrisk).unwrap();

        let saved = db
            .save_simulation(owner.id, None, &p, &result, Some("Opsi 1".into()))
            .await
            .unwrap();
        assert!(saved.is_saved);
        assert_eq!(saved.loan_amount, 105_000_000);
        assert_eq!(saved.vehicle_insurance_type, InsuranceType::Allrisk);

        assert!(db.toggle_simulation_saved(saved.id, other.id).await.is_err());
        let toggled = db.toggle_simulation_saved(saved.id, owner.id).await.unwrap();
        assert!(!toggled.is_saved);

        db.save_simulation(owner.id, None, &p, &result, None)
            .await
            .unwrap();
        let mine = db.user_simulations(owner.id, 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].id > mine[1].id);

        let stats = db.simulation_stats(owner.id).await.unwrap();
        assert_eq!(stats.total_simulations, 2);
        assert_eq!(stats.saved_simulations, 1);
        assert_eq!(stats.most_common_partner.as_deref(), Some("Mandiri Tunas"));

        assert!(db.delete_simulation(saved.id, other.id).await.is_err());
        db.delete_simulation(saved.id, owner.id).await.unwrap();
        assert_eq!(db.user_simulations(owner.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn simulation_for_unknown_car_is_not_found() {
        let db = db().await;
        let owner = user(&db, "owner", false).await;
        let p = db.create_credit_parameter(&input()).await.unwrap();
        let result = simulate(&p, 150_000_000.0, 45_000_000.0, InsuranceType::Tlo).unwrap();

        let err = db
            .save_simulation(owner.id, Some(999), &p, &result, None)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<DomainError>(), Some(&DomainError::NotFound("Car")));

        let car = available_car(&db, &owner, 150_000_000).await;
        let saved = db
            .save_simulation(owner.id, Some(car.id), &p, &result, None)
            .await
            .unwrap();
        assert_eq!(saved.car_id, Some(car.id));
    }
}
