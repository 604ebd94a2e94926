//! Shared-secret authentication for machine-to-machine endpoints.
//!
//! Provides a `TriggerAuth` Axum extractor that validates the
//! `Authorization: Bearer <secret>` header against the configured trigger
//! secret or the platform-injected cron secret.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use stockwatch_common::error::AppError;

use crate::state::AppState;

/// Marker proving the request carried a valid trigger secret.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(_auth: TriggerAuth) -> impl IntoResponse { /* ... */ }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TriggerAuth;

/// Compare two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a raw `Authorization` header value against the accepted secrets.
pub fn verify_bearer(header: Option<&str>, secrets: &[&str]) -> Result<(), AppError> {
    if secrets.is_empty() {
        return Err(AppError::Auth(
            "Trigger endpoint is disabled: no secret configured".to_string(),
        ));
    }

    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::Auth(
                "Missing or invalid Authorization header. Use 'Bearer <secret>'".to_string(),
            )
        })?;

    // Check every secret so timing does not reveal which one matched.
    let matched = secrets
        .iter()
        .fold(false, |acc, s| constant_time_eq(token.as_bytes(), s.as_bytes()) | acc);

    if matched {
        Ok(())
    } else {
        Err(AppError::Auth("Invalid trigger secret".to_string()))
    }
}

impl FromRequestParts<AppState> for TriggerAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        match verify_bearer(header, &state.config.trigger_secrets()) {
            Ok(()) => Ok(TriggerAuth),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected trigger request");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_valid_bearer_accepted() {
        assert!(verify_bearer(Some("Bearer s3cret"), &["s3cret"]).is_ok());
        assert!(verify_bearer(Some("Bearer platform"), &["s3cret", "platform"]).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let result = verify_bearer(Some("Bearer nope"), &["s3cret"]);
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(verify_bearer(None, &["s3cret"]).is_err());
        assert!(verify_bearer(Some("s3cret"), &["s3cret"]).is_err());
        assert!(verify_bearer(Some("Bearer "), &["s3cret"]).is_err());
    }

    #[test]
    fn test_no_configured_secret_rejects_everything() {
        assert!(verify_bearer(Some("Bearer anything"), &[]).is_err());
    }
}
