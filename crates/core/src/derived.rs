//! Pure derived-field computations.
//!
//! Every stored derived value in the system is produced by one of these
//! functions at the write boundary, never hand-maintained, so a persisted
//! total can never disagree with its inputs. The single deliberate exception
//! is the wound surface area, which is one-shot by contract: once set it is
//! never recomputed, because downstream reports depend on the historical
//! value.

use chrono::NaiveDate;
use hmis_types::Money;

/// The five wound-billing charge components plus the amount already paid.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingCharges {
    pub assessment_fee: Money,
    pub treatment_fee: Money,
    pub dressing_supplies_cost: Money,
    pub medication_cost: Money,
    pub other_charges: Money,
    pub amount_paid: Money,
}

/// Derived wound-billing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingTotals {
    pub total_amount: Money,
    pub balance: Money,
}

/// `total_amount` is the exact sum of the five charge components;
/// `balance` is total minus paid. Overpayment yields a negative balance,
/// which is meaningful and allowed.
pub fn billing_totals(charges: &BillingCharges) -> BillingTotals {
    let total_amount = charges.assessment_fee
        + charges.treatment_fee
        + charges.dressing_supplies_cost
        + charges.medication_cost
        + charges.other_charges;
    BillingTotals {
        total_amount,
        balance: total_amount - charges.amount_paid,
    }
}

/// `available_credit` = limit minus balance, with no floor at zero: a balance
/// over the limit produces a negative result (over-limit state).
pub fn available_credit(credit_limit: Money, current_balance: Money) -> Money {
    credit_limit - current_balance
}

/// Invoice balance, derived at read time: total minus patient payments minus
/// the insurance portion.
pub fn invoice_balance(total: Money, paid: Money, insurance: Money) -> Money {
    total - paid - insurance
}

/// Invoice line total: quantity times unit price.
pub fn line_total(quantity: u32, unit_price: Money) -> Money {
    Money::from_minor(i64::from(quantity) * unit_price.minor())
}

/// One-shot wound surface area.
///
/// Computed as length x width only when both dimensions are present AND no
/// area has been stored yet. Once stored, the value is returned unchanged
/// regardless of later edits to the dimensions.
pub fn one_shot_surface_area(
    length_cm: Option<f64>,
    width_cm: Option<f64>,
    existing_area: Option<f64>,
) -> Option<f64> {
    if existing_area.is_some() {
        return existing_area;
    }
    match (length_cm, width_cm) {
        (Some(l), Some(w)) => Some(l * w),
        _ => None,
    }
}

/// Patient age in whole years on `today`, using the original's month/day
/// comparison (birthday not yet reached this year subtracts one).
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    use chrono::Datelike;
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Blood-pressure display string, only when both readings are present.
pub fn blood_pressure_display(systolic: Option<u32>, diastolic: Option<u32>) -> Option<String> {
    match (systolic, diastolic) {
        (Some(s), Some(d)) => Some(format!("{s}/{d}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(major: i64) -> Money {
        Money::from_major(major)
    }

    #[test]
    fn billing_totals_sum_all_five_components() {
        let totals = billing_totals(&BillingCharges {
            assessment_fee: money(500),
            treatment_fee: money(300),
            dressing_supplies_cost: money(50),
            medication_cost: Money::ZERO,
            other_charges: Money::ZERO,
            amount_paid: money(400),
        });
        assert_eq!(totals.total_amount, money(850));
        assert_eq!(totals.balance, money(450));
    }

    #[test]
    fn billing_totals_zero_components() {
        let totals = billing_totals(&BillingCharges::default());
        assert_eq!(totals.total_amount, Money::ZERO);
        assert_eq!(totals.balance, Money::ZERO);
    }

    #[test]
    fn overpayment_yields_negative_balance() {
        let totals = billing_totals(&BillingCharges {
            assessment_fee: money(100),
            amount_paid: money(150),
            ..Default::default()
        });
        assert_eq!(totals.balance, money(-50));
        assert!(totals.balance.is_negative());
    }

    #[test]
    fn available_credit_may_go_negative() {
        assert_eq!(available_credit(money(1_000), money(400)), money(600));
        assert_eq!(available_credit(money(1_000), money(1_200)), money(-200));
    }

    #[test]
    fn surface_area_computed_once() {
        // Unset with both dimensions: compute.
        assert_eq!(one_shot_surface_area(Some(4.0), Some(3.0), None), Some(12.0));
        // Already set: dimension changes do not recompute.
        assert_eq!(
            one_shot_surface_area(Some(6.0), Some(3.0), Some(12.0)),
            Some(12.0)
        );
        // Missing a dimension: stays unset.
        assert_eq!(one_shot_surface_area(Some(4.0), None, None), None);
        assert_eq!(one_shot_surface_area(None, None, None), None);
    }

    #[test]
    fn age_respects_birthday_within_year() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        let before = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(age_on(dob, before), 33);
        assert_eq!(age_on(dob, on), 34);
    }

    #[test]
    fn blood_pressure_requires_both_readings() {
        assert_eq!(blood_pressure_display(Some(120), Some(80)).as_deref(), Some("120/80"));
        assert_eq!(blood_pressure_display(Some(120), None), None);
    }

    #[test]
    fn invoice_arithmetic() {
        assert_eq!(invoice_balance(money(500), money(200), money(100)), money(200));
        assert_eq!(line_total(3, money(40)), money(120));
    }
}
