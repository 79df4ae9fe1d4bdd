//! Authenticate filter (§4.1 step 1).
//!
//! Generalized from the teacher's `require_auth` (`extensions`-insertion,
//! `FromRequestParts` extractor shape) from JWT-validated users down to the
//! opaque-API-key recognition this spec calls for: no JWT, no DB lookup, just
//! "is there a credential and is it long enough".

use axum::http::HeaderMap;

use super::error::AuthError;

/// The minimum required length of the credential string (§4.1).
pub const MIN_CREDENTIAL_LEN: usize = 8;

/// Auth context attached to a request's telemetry record once authenticated.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub client_id: String,
    pub api_key: String,
}

/// Authenticate a request by header.
///
/// Call sites are responsible for consulting the skip-path list first (§4.1:
/// "skip if path matches a configured skip list") — this function always
/// enforces the credential.
pub fn authenticate(headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let raw = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;

    if raw.len() < MIN_CREDENTIAL_LEN {
        return Err(AuthError::CredentialTooShort);
    }

    Ok(AuthContext {
        client_id: raw.chars().take(MIN_CREDENTIAL_LEN).collect(),
        api_key: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(key: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("X-API-Key", key.parse().unwrap());
        h
    }

    #[test]
    fn missing_header_is_rejected() {
        let h = HeaderMap::new();
        assert!(matches!(authenticate(&h), Err(AuthError::MissingCredential)));
    }

    #[test]
    fn short_credential_is_rejected() {
        let h = headers_with("short");
        assert!(matches!(
            authenticate(&h),
            Err(AuthError::CredentialTooShort)
        ));
    }

    #[test]
    fn accepted_credential_derives_client_id_from_first_8_chars() {
        let h = headers_with("abcdefgh12345");
        let ctx = authenticate(&h).unwrap();
        assert_eq!(ctx.client_id, "abcdefgh");
        assert_eq!(ctx.api_key, "abcdefgh12345");
    }

    #[test]
    fn exactly_eight_characters_is_accepted() {
        let h = headers_with("abcdefgh");
        assert!(authenticate(&h).is_ok());
    }
}
