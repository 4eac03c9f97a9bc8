//! Submission id and access code generation.

use rand::Rng;
use uuid::Uuid;

/// Opaque unique submission id. Never reused; the dashless form keeps
/// storage keys shorter.
pub fn new_submission_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Short numeric code for access-restricted activities. One code per
/// restricted activity per submission, not shared globally.
pub fn new_access_code() -> String {
    rand::thread_rng().gen_range(1000..=9999u32).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_ids_are_unique_and_opaque() {
        let a = new_submission_id();
        let b = new_submission_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn access_codes_are_four_digits() {
        for _ in 0..100 {
            let code = new_access_code();
            assert_eq!(code.len(), 4);
            let n: u32 = code.parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }
}
