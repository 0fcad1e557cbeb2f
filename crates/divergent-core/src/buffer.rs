//! Fallible allocation for frequency lists and remap tables.
//!
//! Alphabets reach 2^32 symbols at the widest granularity, so these buffers
//! are allocated with `try_reserve_exact` and failure is reported instead of
//! aborting the process.

use crate::error::{DivergentError, Result};

/// Allocate `len` default-initialized elements.
pub(crate) fn try_zeroed<T: Clone + Default>(len: u64, what: &'static str) -> Result<Vec<T>> {
    let len = usize::try_from(len).map_err(|_| DivergentError::OutOfMemory { what })?;
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| DivergentError::OutOfMemory { what })?;
    out.resize(len, T::default());
    Ok(out)
}

/// Allocate an empty vector with room for `len` elements.
pub(crate) fn try_with_capacity<T>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| DivergentError::OutOfMemory { what })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_has_requested_len() {
        let v: Vec<u64> = try_zeroed(300, "test").unwrap();
        assert_eq!(v.len(), 300);
        assert!(v.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_absurd_request_is_out_of_memory() {
        let err = try_zeroed::<u64>(u64::MAX, "test").unwrap_err();
        assert!(matches!(err, DivergentError::OutOfMemory { .. }));
    }
}
