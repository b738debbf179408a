//! Email verification tokens.
//!
//! A token is the lowercase hex HMAC-SHA256 of the subscriber's email under
//! a deployment-wide secret. Checking decodes the supplied hex and hands the
//! comparison to the Mac's constant-time verifier; non-hex input and tokens
//! of the wrong length are rejected up front.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8], email: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(email.as_bytes());
    mac
}

pub fn verification_token(secret: &[u8], email: &str) -> String {
    hex::encode(mac_for(secret, email).finalize().into_bytes())
}

pub fn verify_token(secret: &[u8], email: &str, token: &str) -> bool {
    let Ok(provided) = hex::decode(token) else {
        return false;
    };
    // verify_slice rejects length mismatches immediately and compares
    // equal-length tags in constant time.
    mac_for(secret, email).verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"not-a-real-secret";

    #[test]
    fn round_trip_token_verifies() {
        let token = verification_token(SECRET, "user@example.com");
        assert!(verify_token(SECRET, "user@example.com", &token));
    }

    #[test]
    fn token_is_bound_to_the_email() {
        let token = verification_token(SECRET, "user@example.com");
        assert!(!verify_token(SECRET, "other@example.com", &token));
    }

    #[test]
    fn token_is_bound_to_the_secret() {
        let token = verification_token(SECRET, "user@example.com");
        assert!(!verify_token(b"rotated-secret", "user@example.com", &token));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mut token = verification_token(SECRET, "user@example.com");
        let flipped = if token.ends_with('0') { '1' } else { '0' };
        token.pop();
        token.push(flipped);
        assert!(!verify_token(SECRET, "user@example.com", &token));
    }

    #[test]
    fn wrong_length_and_non_hex_tokens_are_rejected() {
        assert!(!verify_token(SECRET, "user@example.com", "abcd"));
        assert!(!verify_token(SECRET, "user@example.com", ""));
        assert!(!verify_token(SECRET, "user@example.com", "zz-not-hex"));
    }
}
