use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

use crate::api::state::AppState;
use crate::payment::AuthToken;

pub const ADMIN_TOKEN_HEADER: &str = "x-modexo-admin-token";

fn parse_boolish(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Admin credentials resolved once at startup
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    token: Option<String>,
    required: bool,
}

impl AdminAuth {
    pub fn new(token: Option<String>, required: bool) -> Self {
        Self {
            token: token
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            required,
        }
    }

    /// `MODEXO_API_ADMIN_TOKEN` plus `MODEXO_API_ADMIN_AUTH_REQUIRED` (default true)
    pub fn from_env() -> Self {
        let required = match std::env::var("MODEXO_API_ADMIN_AUTH_REQUIRED") {
            Ok(raw) => parse_boolish(&raw),
            Err(_) => true,
        };
        Self::new(std::env::var("MODEXO_API_ADMIN_TOKEN").ok(), required)
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Short fingerprint safe to log
    pub fn fingerprint(&self) -> Option<String> {
        self.token
            .as_deref()
            .map(|t| admin_token_fingerprint(t)[..12].to_string())
    }

    pub fn is_valid(&self, provided: &str) -> bool {
        self.token.as_deref().is_some_and(|expected| {
            admin_token_fingerprint(provided.trim()) == admin_token_fingerprint(expected)
        })
    }
}

pub fn admin_token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn ensure_admin_authorized(
    admin: &AdminAuth,
    headers: &HeaderMap,
) -> std::result::Result<(), (StatusCode, String)> {
    if !admin.is_configured() {
        if !admin.required {
            return Ok(());
        }
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "admin auth is required but MODEXO_API_ADMIN_TOKEN is not configured".to_string(),
        ));
    }

    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| extract_bearer_token(headers));

    if token.is_some_and(|v| admin.is_valid(v)) {
        return Ok(());
    }

    Err((
        StatusCode::UNAUTHORIZED,
        "admin auth failed (missing/invalid token)".to_string(),
    ))
}

/// Resolve the bearer wallet token and check it carries `permission`
pub async fn require_wallet(
    state: &AppState,
    headers: &HeaderMap,
    permission: &str,
) -> std::result::Result<AuthToken, (StatusCode, String)> {
    let Some(raw) = extract_bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "missing bearer token; sign in via /api/auth/challenge".to_string(),
        ));
    };

    let token = state
        .wallet_auth
        .validate_token(raw)
        .await
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "invalid or expired token".to_string()))?;

    if !token.has_permission(permission) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("token lacks the '{}' permission", permission),
        ));
    }
    Ok(token)
}
