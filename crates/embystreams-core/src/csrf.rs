//! CSRF token verification.
//!
//! The dashboard host issues a per-session secret and the browser echoes it
//! back in a header. Verification compares the two in constant time; this
//! module never issues or rotates session tokens.

use ring::constant_time;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::AuthError;

/// Verify a presented CSRF token against the session-held one.
///
/// Both tokens must be present and non-empty, and equal byte for byte.
/// The comparison does not short-circuit on the first differing byte.
pub fn verify(session_token: Option<&str>, presented_token: Option<&str>) -> Result<(), AuthError> {
    let (expected, given) = match (session_token, presented_token) {
        (Some(e), Some(g)) if !e.is_empty() && !g.is_empty() => (e, g),
        _ => return Err(AuthError::CsrfMismatch),
    };

    constant_time::verify_slices_are_equal(expected.as_bytes(), given.as_bytes())
        .map_err(|_| AuthError::CsrfMismatch)
}

/// Generate a random 32-byte token, hex encoded.
///
/// Only used when the gateway runs standalone and no dashboard host
/// provisions a session secret.
pub fn generate_token() -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut secret = [0u8; 32];
    rng.fill(&mut secret)?;
    Ok(hex::encode(secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn equal_tokens_pass() {
        let t = generate_token().unwrap();
        assert!(verify(Some(&t), Some(&t)).is_ok());
    }

    #[test]
    fn absent_tokens_fail() {
        assert_eq!(verify(None, Some("abc")), Err(AuthError::CsrfMismatch));
        assert_eq!(verify(Some("abc"), None), Err(AuthError::CsrfMismatch));
        assert_eq!(verify(None, None), Err(AuthError::CsrfMismatch));
        assert_eq!(verify(Some(""), Some("")), Err(AuthError::CsrfMismatch));
    }

    #[test]
    fn length_mismatch_fails() {
        assert!(verify(Some("abcdef"), Some("abcde")).is_err());
        assert!(verify(Some("abcde"), Some("abcdef")).is_err());
    }

    #[test]
    fn any_single_byte_difference_fails() {
        let token = generate_token().unwrap();
        let bytes = token.as_bytes();
        for pos in 0..bytes.len() {
            let mut flipped = bytes.to_vec();
            flipped[pos] = if flipped[pos] == b'0' { b'1' } else { b'0' };
            let flipped = String::from_utf8(flipped).unwrap();
            assert!(
                verify(Some(&token), Some(&flipped)).is_err(),
                "difference at byte {pos} was not detected"
            );
        }
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    fn time_mismatch(expected: &str, given: &str, rounds: u32) -> Duration {
        let start = Instant::now();
        for _ in 0..rounds {
            let _ = std::hint::black_box(verify(Some(expected), Some(given)));
        }
        start.elapsed()
    }

    #[test]
    #[ignore = "timing-sensitive; run manually on a quiet machine"]
    fn mismatch_timing_is_position_independent() {
        let token = "a".repeat(4096);
        let mut early = token.clone().into_bytes();
        early[0] = b'b';
        let mut late = token.clone().into_bytes();
        late[4095] = b'b';
        let early = String::from_utf8(early).unwrap();
        let late = String::from_utf8(late).unwrap();

        // warm up
        time_mismatch(&token, &early, 1_000);

        let t_early = time_mismatch(&token, &early, 20_000).as_nanos() as f64;
        let t_late = time_mismatch(&token, &late, 20_000).as_nanos() as f64;
        let ratio = t_early.max(t_late) / t_early.min(t_late);
        assert!(ratio < 1.5, "early/late mismatch timing ratio {ratio}");
    }
}
