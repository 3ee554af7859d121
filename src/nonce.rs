use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Generates a random nonce for the authorization exchange.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_nonce() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_length() {
        assert_eq!(generate_nonce().len(), 22);
    }

    #[test]
    fn test_nonce_url_safe() {
        let nonce = generate_nonce();
        assert!(
            nonce
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "nonce should be URL-safe: {}",
            nonce
        );
    }

    #[test]
    fn test_nonce_uniqueness() {
        assert_ne!(generate_nonce(), generate_nonce(), "nonces should be unique");
    }
}
