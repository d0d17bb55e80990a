//! Capability modules: groups of service handlers installed together.

pub mod who_has;
pub mod who_is;

pub use who_has::WhoHasIHaveServices;
pub use who_is::WhoIsIAmServices;

use bacstack_core::object::MAX_INSTANCE;
use bacstack_core::{RejectReason, ServiceFailure};

/// Whether `instance` falls inside optional device instance limits.
///
/// Limits come in pairs. One without the other, or a limit beyond the
/// largest instance number, makes the request invalid.
pub(crate) fn instance_in_range(
    low: Option<u32>,
    high: Option<u32>,
    instance: u32,
) -> Result<bool, ServiceFailure> {
    match (low, high) {
        (None, None) => Ok(true),
        (Some(low), Some(high)) => {
            if low > MAX_INSTANCE || high > MAX_INSTANCE {
                return Err(ServiceFailure::Reject(RejectReason::ParameterOutOfRange));
            }
            Ok(low <= instance && instance <= high)
        }
        _ => Err(ServiceFailure::Reject(RejectReason::MissingRequiredParameter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limits_matches_everything() {
        assert!(instance_in_range(None, None, 0).unwrap());
        assert!(instance_in_range(None, None, MAX_INSTANCE - 1).unwrap());
    }

    #[test]
    fn limits_are_inclusive() {
        assert!(instance_in_range(Some(10), Some(20), 10).unwrap());
        assert!(instance_in_range(Some(10), Some(20), 20).unwrap());
        assert!(!instance_in_range(Some(10), Some(20), 21).unwrap());
        assert!(!instance_in_range(Some(10), Some(20), 9).unwrap());
    }

    #[test]
    fn half_limits_are_missing_parameter() {
        assert!(matches!(
            instance_in_range(Some(1), None, 1),
            Err(ServiceFailure::Reject(RejectReason::MissingRequiredParameter))
        ));
        assert!(matches!(
            instance_in_range(None, Some(1), 1),
            Err(ServiceFailure::Reject(RejectReason::MissingRequiredParameter))
        ));
    }

    #[test]
    fn oversized_limit_is_out_of_range() {
        assert!(instance_in_range(Some(0), Some(MAX_INSTANCE), 5).unwrap());
        assert!(matches!(
            instance_in_range(Some(0), Some(MAX_INSTANCE + 1), 5),
            Err(ServiceFailure::Reject(RejectReason::ParameterOutOfRange))
        ));
    }
}
