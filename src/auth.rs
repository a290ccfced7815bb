use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;
use crate::controller::AppState;

/// Extractor that admits a request only when it carries
/// `Authorization: Bearer <auth.token>`.
#[derive(Debug, Clone)]
pub struct AuthBearer;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compares SHA-256 digests, so timing depends on neither token's content nor length.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthBearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state.cfg.auth.token.as_str();
        match bearer_token(parts) {
            Some(token) if !expected.is_empty() && tokens_match(token, expected) => Ok(AuthBearer),
            _ => {
                tracing::debug!(path = %parts.uri.path(), "rejected request without valid bearer token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/processes/SWE/merges");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc123"))), Some("abc123"));
        assert_eq!(bearer_token(&parts(Some("Basic abc123"))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("secret-token", "secret-token"));
        assert!(!tokens_match("secret-tokem", "secret-token"));
        assert!(!tokens_match("secret", "secret-token"));
        assert!(!tokens_match("secret-token-and-more", "secret-token"));
        assert!(!tokens_match("", "secret-token"));
        assert!(tokens_match("", ""));
    }
}
