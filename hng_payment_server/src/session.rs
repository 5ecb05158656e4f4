//! Stateless checkout session tokens.
//!
//! The storefront fetches a token when the checkout page loads and posts it back with the form. The token is
//! self-authenticating (HMAC over its own timestamp and nonce) so nothing is stored server-side; its only jobs are
//! CSRF protection and keeping drive-by bots off the checkout endpoint.
use chrono::{Duration, Utc};
use hng_payment_engine::helpers::{hmac_sha256_hex, verify_hmac_sha256};
use rand::{distributions::Alphanumeric, Rng};

use crate::errors::ServerError;

/// Tokens older than this are rejected; the storefront just fetches a fresh one.
pub const SESSION_TOKEN_LIFETIME: Duration = Duration::hours(2);

/// Issue a new session token: `{issued_at}.{nonce}.{signature}`.
pub fn issue_session_token(secret: &str) -> String {
    let issued_at = Utc::now().timestamp();
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect();
    let signature = hmac_sha256_hex(secret, format!("{issued_at}.{nonce}").as_bytes());
    format!("{issued_at}.{nonce}.{signature}")
}

/// Check a token's structure, age and signature.
pub fn verify_session_token(secret: &str, token: &str) -> Result<(), ServerError> {
    let mut parts = token.splitn(3, '.');
    let (issued_at, nonce, signature) = match (parts.next(), parts.next(), parts.next()) {
        (Some(ts), Some(nonce), Some(sig)) => (ts, nonce, sig),
        _ => return Err(ServerError::InvalidSessionToken),
    };
    let issued_at = issued_at.parse::<i64>().map_err(|_| ServerError::InvalidSessionToken)?;
    let age = Utc::now().timestamp() - issued_at;
    if age < 0 || age > SESSION_TOKEN_LIFETIME.num_seconds() {
        return Err(ServerError::InvalidSessionToken);
    }
    verify_hmac_sha256(secret, format!("{issued_at}.{nonce}").as_bytes(), signature)
        .map_err(|_| ServerError::InvalidSessionToken)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let token = issue_session_token("s3kr1t");
        verify_session_token("s3kr1t", &token).unwrap();
    }

    #[test]
    fn wrong_secret_fails() {
        let token = issue_session_token("s3kr1t");
        assert!(verify_session_token("other", &token).is_err());
    }

    #[test]
    fn malformed_tokens_fail() {
        assert!(verify_session_token("s3kr1t", "").is_err());
        assert!(verify_session_token("s3kr1t", "no-dots-here").is_err());
        assert!(verify_session_token("s3kr1t", "abc.def.123").is_err());
    }

    #[test]
    fn stale_tokens_fail() {
        let issued_at = (Utc::now() - SESSION_TOKEN_LIFETIME - Duration::minutes(1)).timestamp();
        let signature = hmac_sha256_hex("s3kr1t", format!("{issued_at}.nonce1").as_bytes());
        let token = format!("{issued_at}.nonce1.{signature}");
        assert!(verify_session_token("s3kr1t", &token).is_err());
    }

    #[test]
    fn future_dated_tokens_fail() {
        let issued_at = (Utc::now() + Duration::minutes(10)).timestamp();
        let signature = hmac_sha256_hex("s3kr1t", format!("{issued_at}.nonce1").as_bytes());
        let token = format!("{issued_at}.nonce1.{signature}");
        assert!(verify_session_token("s3kr1t", &token).is_err());
    }
}
