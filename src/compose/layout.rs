//! Machine account layout sizing
//!
//! The machine account stores a fixed header, a length-prefixed config-line
//! array sized to the declared capacity, and a trailing availability bitmask.
//! The receiving program indexes into this layout by offset, so the size must
//! match exactly: any deviation corrupts the account and is rejected here,
//! before submission.

use crate::errors::EngineError;

/// Bytes of fixed state ahead of the config-line array
pub const HEADER_BYTES: usize = 866;

/// Encoded size of one config line (length-prefixed name + uri)
pub const LINE_BYTES: usize = 240;

/// Exact account size for a machine with `capacity` config lines:
/// `header + 4 + capacity*line + 8 + 2*(capacity/8 + 1)`
/// (array length prefix, line storage, redeem counter, availability bitmask).
pub fn account_size(capacity: u64) -> Result<usize, EngineError> {
    let capacity: usize = capacity
        .try_into()
        .map_err(|_| EngineError::MalformedRequest(format!("capacity {capacity} out of range")))?;

    let lines = capacity
        .checked_mul(LINE_BYTES)
        .ok_or_else(|| size_overflow(capacity))?;
    let bitmask = 2 * (capacity / 8 + 1);

    HEADER_BYTES
        .checked_add(4)
        .and_then(|s| s.checked_add(lines))
        .and_then(|s| s.checked_add(8))
        .and_then(|s| s.checked_add(bitmask))
        .ok_or_else(|| size_overflow(capacity))
}

fn size_overflow(capacity: usize) -> EngineError {
    EngineError::MalformedRequest(format!(
        "account size overflows for capacity {capacity}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_capacity_is_minimal() {
        // header + 4 + 0 + 8 + 2*(0+1)
        assert_eq!(account_size(0).unwrap(), HEADER_BYTES + 4 + 8 + 2);
    }

    #[test]
    fn capacity_ten() {
        assert_eq!(
            account_size(10).unwrap(),
            HEADER_BYTES + 4 + 10 * LINE_BYTES + 8 + 2 * 2
        );
    }

    #[test]
    fn bitmask_steps_every_eight() {
        // 7 and 8 share a bitmask word count; 9 takes the next one
        let at7 = account_size(7).unwrap();
        let at8 = account_size(8).unwrap();
        let at9 = account_size(9).unwrap();
        assert_eq!(at8 - at7, LINE_BYTES + 2);
        assert_eq!(at9 - at8, LINE_BYTES);
    }

    #[test]
    fn absurd_capacity_is_rejected() {
        assert!(matches!(
            account_size(u64::MAX),
            Err(EngineError::MalformedRequest(_))
        ));
    }

    proptest! {
        #[test]
        fn monotone_non_decreasing(capacity in 0u64..100_000) {
            let here = account_size(capacity).unwrap();
            let next = account_size(capacity + 1).unwrap();
            prop_assert!(next >= here);
        }

        #[test]
        fn matches_formula(capacity in 0u64..100_000) {
            let c = capacity as usize;
            let expected = HEADER_BYTES + 4 + c * LINE_BYTES + 8 + 2 * (c / 8 + 1);
            prop_assert_eq!(account_size(capacity).unwrap(), expected);
        }
    }
}
