//! Constant-time signature comparison.

use subtle::ConstantTimeEq;

/// Compare two hex signatures without leaking where they differ.
///
/// Both operands are ASCII-lowercased, since digests are emitted lowercase but
/// may arrive in mixed case. Equal-length inputs are compared by
/// XOR-accumulating every byte with no early exit. Inputs of different length
/// return `false` immediately: only the length leaks, and digest lengths are
/// public constants.
///
/// # Examples
///
/// ```
/// use laterpay_signing::constant_time_eq_ignore_case;
///
/// assert!(constant_time_eq_ignore_case("abc123", "ABC123"));
/// assert!(!constant_time_eq_ignore_case("abc123", "abc124"));
/// assert!(!constant_time_eq_ignore_case("abc", "abc1"));
/// ```
#[must_use]
pub fn constant_time_eq_ignore_case(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();

    a.as_bytes().ct_eq(b.as_bytes()).into()
}
