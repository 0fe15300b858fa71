//! Opaque random code generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Entropy for email confirmation codes.
pub const CONFIRMATION_CODE_BYTES: usize = 10;

/// Entropy for refresh-token secrets.
pub const REFRESH_SECRET_BYTES: usize = 32;

/// Generate `len_bytes` of CSPRNG output, URL-safe base64 encoded.
///
/// The thread RNG is cryptographically secure and reseeded from the OS;
/// a failure to obtain randomness aborts the operation rather than
/// degrading to a weaker source.
pub fn generate(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_length_matches_entropy() {
        // ceil(n * 8 / 6) characters without padding
        assert_eq!(generate(CONFIRMATION_CODE_BYTES).len(), 14);
        assert_eq!(generate(REFRESH_SECRET_BYTES).len(), 43);
    }

    #[test]
    fn alphabet_is_url_safe() {
        let code = generate(REFRESH_SECRET_BYTES);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn codes_are_not_repeated() {
        let a = generate(CONFIRMATION_CODE_BYTES);
        let b = generate(CONFIRMATION_CODE_BYTES);
        assert_ne!(a, b);
    }
}
