//! Credit simulation for financing a car through a leasing partner.

use crate::error::{DomainError, DomainResult, Violations};
use crate::schema::{
    AmortizationRow, CreditParameter, CreditParameterInput, CreditSimulation, InsuranceType,
    InterestType, SimulationResult,
};

pub const MAX_TENOR_MONTHS: i64 = 84;

pub fn validate_parameter(input: &CreditParameterInput) -> DomainResult<()> {
    let mut v = Violations::new();
    v.check(!input.partner_name.trim().is_empty(), "Partner name is required");
    v.check(!input.name.trim().is_empty(), "Name is required");
    v.check(
        input.min_dp_percentage >= 0.0,
        "Minimum down payment cannot be negative",
    );
    v.check(
        input.max_dp_percentage <= 100.0,
        "Maximum down payment cannot exceed 100%",
    );
    v.check(
        input.min_dp_percentage <= input.max_dp_percentage,
        "Minimum down payment cannot exceed the maximum",
    );
    v.check(
        (1..=MAX_TENOR_MONTHS).contains(&input.tenor_months),
        "Tenor must be between 1 and 84 months",
    );
    v.check(
        input.interest_rate_yearly >= 0.0,
        "Interest rate cannot be negative",
    );
    v.check(
        input.admin_fee >= 0 && input.fidusia_fee >= 0,
        "Fees cannot be negative",
    );
    v.check(
        [
            input.provision_fee_percentage,
            input.insurance_tlo_percentage,
            input.insurance_allrisk_percentage,
            input.life_insurance_percentage,
        ]
        .iter()
        .all(|p| *p >= 0.0),
        "Percentages cannot be negative",
    );
    if let (Some(min), Some(max)) = (input.min_otr, input.max_otr) {
        v.check(min <= max, "Minimum OTR cannot exceed the maximum");
    }
    v.into_result()
}

fn monthly_rate(yearly: f64) -> f64 {
    yearly / 100.0 / 12.0
}

fn annuity_installment(loan: f64, rate: f64, tenor: i64) -> f64 {
    if rate == 0.0 {
        return loan / tenor as f64;
    }
    let factor = (1.0 + rate).powi(tenor as i32);
    loan * rate * factor / (factor - 1.0)
}

/// Simulation over the parameter's full tenor.
pub fn simulate(
    parameter: &CreditParameter,
    otr_price: f64,
    down_payment: f64,
    insurance: InsuranceType,
) -> DomainResult<SimulationResult> {
    simulate_with_tenor(parameter, otr_price, down_payment, insurance, None)
}

/// Like [`simulate`], for a tenor the buyer picked. It cannot exceed the
/// parameter's tenor.
pub fn simulate_with_tenor(
    parameter: &CreditParameter,
    otr_price: f64,
    down_payment: f64,
    insurance: InsuranceType,
    tenor_months: Option<i64>,
) -> DomainResult<SimulationResult> {
    if !parameter.is_active {
        return Err(DomainError::state("Credit parameter is not active"));
    }
    if otr_price <= 0.0 {
        return Err(DomainError::invalid("OTR price must be positive"));
    }
    if down_payment < 0.0 || down_payment >= otr_price {
        return Err(DomainError::invalid(
            "Down payment must be between zero and the OTR price",
        ));
    }
    if parameter.min_otr.is_some_and(|min| otr_price < min as f64)
        || parameter.max_otr.is_some_and(|max| otr_price > max as f64)
    {
        return Err(DomainError::invalid(
            "OTR price is outside the range of this credit parameter",
        ));
    }
    let dp_percentage = down_payment / otr_price * 100.0;
    if dp_percentage < parameter.min_dp_percentage || dp_percentage > parameter.max_dp_percentage
    {
        return Err(DomainError::invalid(format!(
            "Down payment must be between {}% and {}%",
            parameter.min_dp_percentage, parameter.max_dp_percentage
        )));
    }

    let tenor = tenor_months.unwrap_or(parameter.tenor_months);
    if !(1..=parameter.tenor_months).contains(&tenor) {
        return Err(DomainError::invalid(format!(
            "Tenor must be between 1 and {} months",
            parameter.tenor_months
        )));
    }
    let loan = otr_price - down_payment;
    let (installment, total_interest) = match parameter.interest_type {
        InterestType::Flat => {
            let interest_per_month = loan * parameter.interest_rate_yearly / 100.0 / 12.0;
            let total_interest = interest_per_month * tenor as f64;
            ((loan + total_interest) / tenor as f64, total_interest)
        }
        InterestType::Efektif | InterestType::Anuitas => {
            let installment =
                annuity_installment(loan, monthly_rate(parameter.interest_rate_yearly), tenor);
            (installment, installment * tenor as f64 - loan)
        }
    };

    let provision_fee = loan * parameter.provision_fee_percentage / 100.0;
    let life_insurance = loan * parameter.life_insurance_percentage / 100.0;
    let insurance_rate = match insurance {
        InsuranceType::Tlo => parameter.insurance_tlo_percentage,
        InsuranceType::Allrisk => parameter.insurance_allrisk_percentage,
    };
    let vehicle_insurance_yearly = otr_price * insurance_rate / 100.0;
    let insurance_years = (tenor + 11) / 12;
    let admin_fee = parameter.admin_fee as f64;
    let fidusia_fee = parameter.fidusia_fee as f64;

    let total_initial_payment = down_payment
        + admin_fee
        + provision_fee
        + fidusia_fee
        + life_insurance
        + vehicle_insurance_yearly;

    Ok(SimulationResult {
        otr_price,
        down_payment,
        down_payment_percentage: dp_percentage,
        loan_amount: loan,
        tenor_months: tenor,
        interest_rate_yearly: parameter.interest_rate_yearly,
        interest_type: parameter.interest_type,
        monthly_installment: installment,
        total_interest,
        admin_fee,
        provision_fee,
        fidusia_fee,
        life_insurance,
        vehicle_insurance_type: insurance,
        vehicle_insurance_yearly,
        vehicle_insurance_total: vehicle_insurance_yearly * insurance_years as f64,
        total_initial_payment,
        total_payment: total_initial_payment + installment * tenor as f64,
    })
}

/// Month-by-month split of each installment. Flat loans repay principal
/// and interest in equal parts; annuity loans charge interest on the
/// remaining balance.
pub fn amortization(result: &SimulationResult) -> Vec<AmortizationRow> {
    let tenor = result.tenor_months.max(1);
    let mut balance = result.loan_amount;
    let mut rows = Vec::with_capacity(tenor as usize);
    let rate = monthly_rate(result.interest_rate_yearly);

    for month in 1..=tenor {
        let (principal, interest) = match result.interest_type {
            InterestType::Flat => (
                result.loan_amount / tenor as f64,
                result.total_interest / tenor as f64,
            ),
            InterestType::Efektif | InterestType::Anuitas => {
                let interest = balance * rate;
                (result.monthly_installment - interest, interest)
            }
        };
        balance = (balance - principal).max(0.0);
        if month == tenor {
            balance = 0.0;
        }
        rows.push(AmortizationRow {
            month,
            principal,
            interest,
            installment: principal + interest,
            remaining_balance: balance,
        });
    }
    rows
}

/// Persisted amounts are whole rupiah.
pub fn rounded(value: f64) -> i64 {
    value.round() as i64
}

/// Average monthly installment and most frequent partner of a user's
/// simulations.
pub fn summarize(simulations: &[CreditSimulation]) -> (f64, Option<String>) {
    if simulations.is_empty() {
        return (0.0, None);
    }
    let avg = simulations
        .iter()
        .map(|s| s.monthly_installment as f64)
        .sum::<f64>()
        / simulations.len() as f64;

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for partner in simulations.iter().filter_map(|s| s.partner_name.as_deref()) {
        match counts.iter_mut().find(|(name, _)| *name == partner) {
            Some((_, n)) => *n += 1,
            None => counts.push((partner, 1)),
        }
    }
    // first seen wins a tie
    let most_common = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, &(name, n)| match best {
            Some((_, b)) if b >= n => best,
            _ => Some((name, n)),
        })
        .map(|(name, _)| name.to_string());
    (avg, most_common)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter(interest_type: InterestType) -> CreditParameter {
        CreditParameter {
            id: 1,
            partner_name: "BCA Finance".into(),
            name: "Reguler 36".into(),
            min_dp_percentage: 20.0,
            max_dp_percentage: 50.0,
            tenor_months: 36,
            interest_rate_yearly: 6.0,
            interest_type,
            admin_fee: 2_500_000,
            provision_fee_percentage: 1.0,
            fidusia_fee: 500_000,
            insurance_tlo_percentage: 0.4,
            insurance_allrisk_percentage: 2.5,
            life_insurance_percentage: 0.5,
            min_otr: None,
            max_otr: None,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn input() -> CreditParameterInput {
        CreditParameterInput {
            partner_name: "Adira".into(),
            name: "Promo".into(),
            min_dp_percentage: 10.0,
            max_dp_percentage: 60.0,
            tenor_months: 48,
            interest_rate_yearly: 7.5,
            interest_type: InterestType::Flat,
            admin_fee: 0,
            provision_fee_percentage: 0.0,
            fidusia_fee: 0,
            insurance_tlo_percentage: 0.0,
            insurance_allrisk_percentage: 0.0,
            life_insurance_percentage: 0.0,
            min_otr: None,
            max_otr: None,
            is_active: true,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn flat_simulation() {
        let r = simulate(
            &parameter(InterestType::Flat),
            200_000_000.0,
            60_000_000.0,
            InsuranceType::Tlo,
        )
        .unwrap();
        assert!(close(r.loan_amount, 140_000_000.0));
        assert!(close(r.down_payment_percentage, 30.0));
        // 140m * 6% / 12 = 700k per month
        assert!(close(r.total_interest, 25_200_000.0));
        assert!(close(r.monthly_installment, 4_588_888.888));
        assert!(close(r.provision_fee, 1_400_000.0));
        assert!(close(r.life_insurance, 700_000.0));
        assert!(close(r.vehicle_insurance_yearly, 800_000.0));
        assert!(close(r.vehicle_insurance_total, 2_400_000.0));
        let initial = 60_000_000.0 + 2_500_000.0 + 1_400_000.0 + 500_000.0 + 700_000.0 + 800_000.0;
        assert!(close(r.total_initial_payment, initial));
        assert!(close(r.total_payment, initial + 140_000_000.0 + 25_200_000.0));
    }

    #[test]
    fn annuity_simulation() {
        let r = simulate(
            &parameter(InterestType::Anuitas),
            200_000_000.0,
            60_000_000.0,
            InsuranceType::Allrisk,
        )
        .unwrap();
        // standard 6% / 36 month annuity factor
        assert!((r.monthly_installment - 4_259_071.0).abs() < 5.0);
        assert!(close(r.total_interest, r.monthly_installment * 36.0 - 140_000_000.0));
        assert!(close(r.vehicle_insurance_yearly, 5_000_000.0));
    }

    #[test]
    fn zero_rate_divides_evenly() {
        let mut p = parameter(InterestType::Efektif);
        p.interest_rate_yearly = 0.0;
        let r = simulate(&p, 100_000_000.0, 28_000_000.0, InsuranceType::Tlo).unwrap();
        assert!(close(r.monthly_installment, 2_000_000.0));
        assert!(close(r.total_interest, 0.0));
    }

    #[test]
    fn down_payment_outside_range() {
        let p = parameter(InterestType::Flat);
        let err = simulate(&p, 200_000_000.0, 10_000_000.0, InsuranceType::Tlo).unwrap_err();
        assert_eq!(
            err,
            DomainError::invalid("Down payment must be between 20% and 50%")
        );
        assert!(simulate(&p, 200_000_000.0, 200_000_000.0, InsuranceType::Tlo).is_err());
    }

    #[test]
    fn otr_bounds_and_inactive_parameter() {
        let mut p = parameter(InterestType::Flat);
        p.max_otr = Some(150_000_000);
        assert!(simulate(&p, 200_000_000.0, 60_000_000.0, InsuranceType::Tlo).is_err());
        p.max_otr = None;
        p.is_active = false;
        assert!(matches!(
            simulate(&p, 200_000_000.0, 60_000_000.0, InsuranceType::Tlo),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn amortization_pays_off_loan() {
        for kind in [InterestType::Flat, InterestType::Anuitas] {
            let r = simulate(&parameter(kind), 200_000_000.0, 60_000_000.0, InsuranceType::Tlo)
                .unwrap();
            let rows = amortization(&r);
            assert_eq!(rows.len(), 36);
            assert_eq!(rows[35].remaining_balance, 0.0);
            let principal: f64 = rows.iter().map(|row| row.principal).sum();
            assert!((principal - 140_000_000.0).abs() < 1.0);
            assert!(close(rows[0].installment, r.monthly_installment));
        }
    }

    #[test]
    fn shorter_tenor_within_parameter() {
        let p = parameter(InterestType::Flat);
        let r = simulate_with_tenor(&p, 200_000_000.0, 60_000_000.0, InsuranceType::Tlo, Some(12))
            .unwrap();
        assert_eq!(r.tenor_months, 12);
        assert!(close(r.total_interest, 8_400_000.0));
        assert!(close(r.vehicle_insurance_total, 800_000.0));
        assert_eq!(amortization(&r).len(), 12);

        for tenor in [0, -12, 48] {
            let err = simulate_with_tenor(
                &p,
                200_000_000.0,
                60_000_000.0,
                InsuranceType::Tlo,
                Some(tenor),
            )
            .unwrap_err();
            assert_eq!(err, DomainError::invalid("Tenor must be between 1 and 36 months"));
        }
    }

    #[test]
    fn annuity_interest_shrinks() {
        let r = simulate(
            &parameter(InterestType::Efektif),
            200_000_000.0,
            60_000_000.0,
            InsuranceType::Tlo,
        )
        .unwrap();
        let rows = amortization(&r);
        assert!(rows[0].interest > rows[35].interest);
        assert!(close(rows[0].interest, 700_000.0));
    }

    #[test]
    fn parameter_validation() {
        assert!(validate_parameter(&input()).is_ok());

        let mut bad = input();
        bad.name = " ".into();
        bad.tenor_months = 120;
        bad.min_dp_percentage = 70.0;
        bad.min_otr = Some(10);
        bad.max_otr = Some(5);
        match validate_parameter(&bad) {
            Err(DomainError::Invalid(messages)) => assert_eq!(messages.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn summary_of_simulations() {
        assert_eq!(summarize(&[]), (0.0, None));
        let sim = |partner: &str, monthly: i64| CreditSimulation {
            id: 0,
            user_id: 1,
            car_id: None,
            credit_parameter_id: None,
            partner_name: Some(partner.into()),
            otr_price: 0,
            down_payment: 0,
            down_payment_percentage: 0.0,
            loan_amount: 0,
            tenor_months: 12,
            interest_rate_yearly: 0.0,
            interest_type: InterestType::Flat,
            monthly_installment: monthly,
            total_interest: 0,
            admin_fee: 0,
            provision_fee: 0,
            fidusia_fee: 0,
            life_insurance: 0,
            vehicle_insurance_type: InsuranceType::Tlo,
            vehicle_insurance_yearly: 0,
            vehicle_insurance_total: 0,
            total_initial_payment: 0,
            total_payment: 0,
            is_saved: false,
            notes: None,
            created_at: None,
            updated_at: None,
        };
        let (avg, partner) = summarize(&[sim("Adira", 100), sim("BCA", 200), sim("BCA", 300)]);
        assert!(close(avg, 200.0));
        assert_eq!(partner.as_deref(), Some("BCA"));
    }
}
