//! Expense segments.
//!
//! An expense can be split into category segments, each carrying an amount
//! and the share of the expense it represents. A single segment may seed an
//! unsegmented expense; a batch replaces the whole set and must account for
//! the full expense amount. Percentages are derived from the amounts when
//! not supplied.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::error::DomainError;

/// Upper bound on segments accepted in one batch.
pub const MAX_SEGMENTS: usize = 20;

/// A stored segment row.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub category: String,
    pub amount: Decimal,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested segment, before persistence. `percentage` is optional and
/// computed from the amounts when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInput {
    pub category: String,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
}

/// Share of `total` that `amount` represents, rounded half-up to two
/// decimal places. A zero total yields zero.
pub fn percentage_of(amount: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    (amount * Decimal::ONE_HUNDRED / total)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A single segment must not exceed the expense amount.
pub fn check_segment_fits(
    expense_amount: Decimal,
    segment_amount: Decimal,
) -> Result<(), DomainError> {
    if segment_amount > expense_amount {
        return Err(DomainError::invalid_operation(format!(
            "Segment amount ({}) exceeds expense amount ({})",
            segment_amount, expense_amount
        )));
    }
    Ok(())
}

/// A full segment set must cover the expense amount (within 0.01 of
/// rounding slack) and use distinct categories.
pub fn check_segment_batch(
    expense_amount: Decimal,
    segments: &[SegmentInput],
) -> Result<(), DomainError> {
    if segments.is_empty() {
        return Err(DomainError::invalid_operation(
            "At least one segment is required",
        ));
    }
    if segments.len() > MAX_SEGMENTS {
        return Err(DomainError::invalid_operation(format!(
            "Cannot create more than {} segments at once",
            MAX_SEGMENTS
        )));
    }

    let total: Decimal = segments.iter().map(|s| s.amount).sum();
    if (total - expense_amount).abs() > Decimal::new(1, 2) {
        return Err(DomainError::invalid_operation(format!(
            "Total segments amount ({}) must equal expense amount ({})",
            total, expense_amount
        )));
    }

    let mut categories: Vec<String> = segments
        .iter()
        .map(|s| s.category.trim().to_lowercase())
        .collect();
    categories.sort();
    categories.dedup();
    if categories.len() != segments.len() {
        return Err(DomainError::invalid_operation(
            "Segment categories must be unique within an expense",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn segment(category: &str, amount: Decimal) -> SegmentInput {
        SegmentInput {
            category: category.to_string(),
            amount,
            percentage: None,
        }
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        assert_eq!(percentage_of(dec!(50), dec!(100)), dec!(50));
        assert_eq!(percentage_of(dec!(1), dec!(3)), dec!(33.33));
        assert_eq!(percentage_of(dec!(1), dec!(8)), dec!(12.5));
        assert_eq!(percentage_of(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_single_segment_must_fit_the_expense() {
        assert!(check_segment_fits(dec!(100.00), dec!(100.00)).is_ok());
        assert!(check_segment_fits(dec!(100.00), dec!(40.00)).is_ok());

        let err = check_segment_fits(dec!(100.00), dec!(100.01)).unwrap_err();
        assert!(err.to_string().contains("exceeds expense amount"));
    }

    #[test]
    fn test_batch_total_allows_rounding_slack() {
        let exact = [segment("Meals", dec!(60.00)), segment("Travel", dec!(40.00))];
        assert!(check_segment_batch(dec!(100.00), &exact).is_ok());

        let within_slack = [segment("Meals", dec!(60.00)), segment("Travel", dec!(39.99))];
        assert!(check_segment_batch(dec!(100.00), &within_slack).is_ok());

        let off = [segment("Meals", dec!(60.00)), segment("Travel", dec!(39.98))];
        let err = check_segment_batch(dec!(100.00), &off).unwrap_err();
        assert!(err.to_string().contains("must equal expense amount"));
    }

    #[test]
    fn test_batch_rejects_duplicate_categories_case_insensitively() {
        let segments = [segment("Meals", dec!(50.00)), segment(" meals ", dec!(50.00))];
        let err = check_segment_batch(dec!(100.00), &segments).unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn test_batch_bounds() {
        assert!(check_segment_batch(dec!(100.00), &[]).is_err());

        let many: Vec<SegmentInput> = (0..21)
            .map(|i| segment(&format!("c{}", i), dec!(1.00)))
            .collect();
        assert!(check_segment_batch(dec!(21.00), &many).is_err());
    }
}
