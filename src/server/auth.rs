//! Authentication middleware for protected endpoints.
//!
//! Token resolution order:
//! 1. `Authorization: MediaBrowser ..., Token="<token>"` (Jellyfin clients)
//! 2. `X-Emby-Token: <token>`
//! 3. `Authorization: Bearer <token>`
//! 4. `?api_key=<token>` query parameter

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::AuthConfig;
use crate::error::{AppError, Error};
use crate::server::AppContext;

/// Check the request's credentials against the configured api key.
pub fn validate_auth(
    auth_config: &AuthConfig,
    authorization: Option<&str>,
    x_emby_token: Option<&str>,
    query: Option<&str>,
) -> bool {
    if !auth_config.enabled {
        return true;
    }
    let Some(api_key) = auth_config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return false;
    };

    if let Some(auth_value) = authorization {
        if auth_value.starts_with("MediaBrowser ") || auth_value.starts_with("Emby ") {
            if extract_mediabrowser_token(auth_value).as_deref() == Some(api_key) {
                return true;
            }
        }
    }

    if x_emby_token == Some(api_key) {
        return true;
    }

    if let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) {
        if token == api_key {
            return true;
        }
    }

    query
        .and_then(query_api_key)
        .is_some_and(|token| token == api_key)
}

/// Extract Token value from MediaBrowser/Emby authorization header.
/// Format: `MediaBrowser Client="...", Device="...", Token="<token>"`
pub fn extract_mediabrowser_token(header: &str) -> Option<String> {
    for part in header.split(',') {
        let part = part.trim();
        let part = part
            .strip_prefix("MediaBrowser ")
            .or_else(|| part.strip_prefix("Emby "))
            .unwrap_or(part);
        if let Some(rest) = part.strip_prefix("Token=") {
            return Some(rest.trim_matches('"').to_string());
        }
    }
    None
}

fn query_api_key(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.eq_ignore_ascii_case("api_key") || key.eq_ignore_ascii_case("ApiKey")).then_some(value)
    })
}

/// Authentication middleware. Applied to protected routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let headers = request.headers();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let x_emby_token = headers.get("X-Emby-Token").and_then(|v| v.to_str().ok());

    if validate_auth(
        &ctx.config.server.auth,
        authorization,
        x_emby_token,
        request.uri().query(),
    ) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(uri = %request.uri(), "Rejected unauthenticated request");
        Err(AppError::from(Error::Unauthorized("authentication required".into())).into_response())
    }
}

/// Generate a random API key
pub fn generate_api_key() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(key: &str) -> AuthConfig {
        AuthConfig {
            enabled: true,
            api_key: Some(key.to_string()),
        }
    }

    #[test]
    fn test_disabled_accepts_everything() {
        assert!(validate_auth(&AuthConfig::default(), None, None, None));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(!validate_auth(&enabled("k"), None, None, None));
    }

    #[test]
    fn test_mediabrowser_header() {
        let header = r#"MediaBrowser Client="Web", Device="Firefox", DeviceId="d1", Token="k""#;
        assert!(validate_auth(&enabled("k"), Some(header), None, None));
        assert!(!validate_auth(&enabled("other"), Some(header), None, None));
    }

    #[test]
    fn test_emby_token_header() {
        assert!(validate_auth(&enabled("k"), None, Some("k"), None));
        assert!(!validate_auth(&enabled("k"), None, Some("nope"), None));
    }

    #[test]
    fn test_bearer_header() {
        assert!(validate_auth(&enabled("k"), Some("Bearer k"), None, None));
        assert!(!validate_auth(&enabled("k"), Some("Bearer x"), None, None));
    }

    #[test]
    fn test_query_api_key() {
        assert!(validate_auth(&enabled("k"), None, None, Some("deviceId=d&api_key=k")));
        assert!(validate_auth(&enabled("k"), None, None, Some("ApiKey=k")));
        assert!(!validate_auth(&enabled("k"), None, None, Some("api_key=x")));
    }

    #[test]
    fn test_enabled_without_key_rejects() {
        let config = AuthConfig {
            enabled: true,
            api_key: None,
        };
        assert!(!validate_auth(&config, Some("Bearer "), Some(""), Some("api_key=")));
    }

    #[test]
    fn test_extract_mediabrowser_token() {
        let header = r#"MediaBrowser Token="abc", Client="Web""#;
        assert_eq!(extract_mediabrowser_token(header).as_deref(), Some("abc"));
        assert_eq!(extract_mediabrowser_token(r#"MediaBrowser Client="Web""#), None);
    }

    #[test]
    fn test_generate_api_key_is_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }
}
