// Identifier and clock helpers shared by the gateway and the OAuth flow.

use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `len` random characters from `[0-9a-z]`.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Request id for tracing and dedup: `req_<millis>_<9 chars>`.
pub fn request_id() -> String {
    format!("req_{}_{}", now_millis(), random_base36(9))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_have_prefix_and_differ() {
        let a = request_id();
        let b = request_id();
        assert!(a.starts_with("req_"));
        assert_eq!(a.rsplit('_').next().map(str::len), Some(9));
        assert_ne!(a, b);
    }

    #[test]
    fn base36_alphabet_only() {
        let s = random_base36(64);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
