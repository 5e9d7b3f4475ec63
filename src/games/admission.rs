//! Cap rules deciding how much of a contribution request enters the pool.

use crate::errors::GameError;
use crate::games::types::{GameInstance, GameVariant};

/// Validate a raw requested amount from the boundary
pub fn validate_requested(requested: i64) -> Result<u64, GameError> {
    if requested <= 0 {
        return Err(GameError::InvalidAmount(requested));
    }
    Ok(requested as u64)
}

/// Amount admitted for `requested` against the instance's current total.
///
/// Risk games admit all or nothing. Investment games trim the request to the
/// remaining capacity and only reject once the pool is full.
pub fn admitted_amount(instance: &GameInstance, requested: u64) -> Result<u64, GameError> {
    let total = instance.total;
    let cap = instance.cap;
    let fits = total.checked_add(requested).map_or(false, |next| next <= cap);

    if fits {
        return Ok(requested);
    }

    match instance.variant {
        GameVariant::Risk => Err(GameError::CapExceeded { requested, total, cap }),
        GameVariant::Investment if total < cap => Ok(cap - total),
        GameVariant::Investment => Err(GameError::CapExceeded { requested, total, cap }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::Multiplier;

    fn instance(variant: GameVariant, cap: u64, total: u64) -> GameInstance {
        let mut instance = GameInstance::new(variant, cap, Multiplier::from_f64(1.0).unwrap());
        instance.total = total;
        instance
    }

    #[test]
    fn test_rejects_non_positive_requests() {
        assert!(matches!(validate_requested(0), Err(GameError::InvalidAmount(0))));
        assert!(matches!(validate_requested(-5), Err(GameError::InvalidAmount(-5))));
        assert_eq!(validate_requested(7).unwrap(), 7);
    }

    #[test]
    fn test_full_admission_within_cap() {
        assert_eq!(admitted_amount(&instance(GameVariant::Risk, 500, 300), 200).unwrap(), 200);
        assert_eq!(admitted_amount(&instance(GameVariant::Investment, 1000, 0), 600).unwrap(), 600);
    }

    #[test]
    fn test_risk_rejects_overflow_outright() {
        let err = admitted_amount(&instance(GameVariant::Risk, 500, 450), 51).unwrap_err();
        assert!(matches!(err, GameError::CapExceeded { requested: 51, total: 450, cap: 500 }));
    }

    #[test]
    fn test_investment_partial_fill() {
        assert_eq!(admitted_amount(&instance(GameVariant::Investment, 1000, 600), 500).unwrap(), 400);
        assert_eq!(admitted_amount(&instance(GameVariant::Investment, 1000, 999), 50).unwrap(), 1);
    }

    #[test]
    fn test_investment_rejects_when_full() {
        let err = admitted_amount(&instance(GameVariant::Investment, 1000, 1000), 1).unwrap_err();
        assert!(matches!(err, GameError::CapExceeded { .. }));
    }

    #[test]
    fn test_overflowing_request_is_treated_as_exceeding_cap() {
        let err = admitted_amount(&instance(GameVariant::Risk, u64::MAX, 10), u64::MAX).unwrap_err();
        assert!(matches!(err, GameError::CapExceeded { .. }));
        assert_eq!(
            admitted_amount(&instance(GameVariant::Investment, u64::MAX, 10), u64::MAX).unwrap(),
            u64::MAX - 10
        );
    }
}
