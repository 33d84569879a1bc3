//! Wallet Authentication
//!
//! Sign-in-with-wallet: the server issues a nonce challenge, the wallet
//! signs the challenge message with its ed25519 key, and a verified
//! signature is exchanged for a bearer token. Repeated bad signatures lock
//! the wallet out for a cooldown.

use crate::config::AuthConfig;
use crate::error::{ModexoError, Result};
use crate::validation::{decode_public_key, decode_signature, is_valid_solana_address};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Permissions granted to every wallet token
pub const DEFAULT_PERMISSIONS: &[&str] = &["read", "watchlist", "escrow"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAuthSession {
    pub wallet: String,
    pub nonce: String,
    pub message: String,
    pub signature: Option<String>,
    pub verified: bool,
    pub attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WalletAuthSession {
    fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    pub wallet: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
}

impl AuthToken {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Challenge handed to the client for signing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    pub wallet: String,
    pub nonce: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

pub struct WalletAuthenticator {
    config: AuthConfig,
    sessions: RwLock<HashMap<String, WalletAuthSession>>,
    tokens: RwLock<HashMap<String, AuthToken>>,
}

impl WalletAuthenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AuthConfig::default())
    }

    pub fn challenge_message(wallet: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
        format!(
            "Sign in to MODEXO\n\nWallet: {}\nNonce: {}\nIssued At: {}",
            wallet,
            nonce,
            issued_at.to_rfc3339()
        )
    }

    /// Issue a fresh challenge; `None` for invalid or locked-out wallets
    pub async fn issue_challenge(&self, wallet: &str) -> Option<AuthChallenge> {
        self.issue_challenge_at(wallet, Utc::now()).await
    }

    pub async fn issue_challenge_at(
        &self,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> Option<AuthChallenge> {
        if !is_valid_solana_address(wallet) {
            return None;
        }

        let mut sessions = self.sessions.write().await;
        // Attempts survive a re-challenge so lockout cannot be reset by asking again
        let attempts = match sessions.get(wallet) {
            Some(existing) if existing.is_locked(now) => return None,
            Some(existing) if existing.locked_until.is_none() => existing.attempts,
            _ => 0,
        };

        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let message = Self::challenge_message(wallet, &nonce, now);
        let expires_at = now + Duration::seconds(self.config.nonce_ttl_secs);

        sessions.insert(
            wallet.to_string(),
            WalletAuthSession {
                wallet: wallet.to_string(),
                nonce: nonce.clone(),
                message: message.clone(),
                signature: None,
                verified: false,
                attempts,
                locked_until: None,
                issued_at: now,
                expires_at,
            },
        );

        Some(AuthChallenge {
            wallet: wallet.to_string(),
            nonce,
            message,
            expires_at,
        })
    }

    /// Verify a base58 signature of the pending challenge and issue a token
    pub async fn verify_signature(&self, wallet: &str, signature: &str) -> Result<AuthToken> {
        self.verify_signature_at(wallet, signature, Utc::now()).await
    }

    pub async fn verify_signature_at(
        &self,
        wallet: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthToken> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(wallet)
            .ok_or_else(|| ModexoError::Auth("no challenge issued for wallet".to_string()))?;

        if session.is_locked(now) {
            return Err(ModexoError::RateLimited(format!(
                "wallet locked until {}",
                session.locked_until.unwrap_or(now).to_rfc3339()
            )));
        }
        if session.verified {
            return Err(ModexoError::Auth("challenge already used".to_string()));
        }
        if now >= session.expires_at {
            return Err(ModexoError::Auth("challenge expired".to_string()));
        }

        if let Err(e) = Self::check_signature(wallet, &session.message, signature) {
            session.attempts += 1;
            if session.attempts >= self.config.max_attempts {
                let until = now + Duration::seconds(self.config.lockout_secs);
                session.locked_until = Some(until);
                session.attempts = 0;
                warn!("Wallet {} locked out until {}", wallet, until);
            }
            return Err(e);
        }

        session.verified = true;
        session.signature = Some(signature.trim().to_string());
        session.attempts = 0;
        drop(sessions);

        let token = AuthToken {
            token: hex::encode(rand::random::<[u8; 32]>()),
            wallet: wallet.to_string(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.config.token_ttl_secs),
            permissions: DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        };
        self.tokens
            .write()
            .await
            .insert(token.token.clone(), token.clone());

        info!("Wallet {} authenticated", wallet);
        Ok(token)
    }

    fn check_signature(wallet: &str, message: &str, signature: &str) -> Result<()> {
        let sig_bytes = decode_signature(signature)?;
        let key_bytes = decode_public_key(wallet)?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| ModexoError::Validation(format!("invalid public key: {}", e)))?;
        let sig = Signature::from_bytes(&sig_bytes);

        key.verify(message.as_bytes(), &sig)
            .map_err(|_| ModexoError::Auth("signature does not match challenge".to_string()))
    }

    /// Resolve a bearer token; expired tokens are dropped
    pub async fn validate_token(&self, token: &str) -> Option<AuthToken> {
        self.validate_token_at(token, Utc::now()).await
    }

    pub async fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Option<AuthToken> {
        let mut tokens = self.tokens.write().await;
        match tokens.get(token) {
            Some(t) if now < t.expires_at => Some(t.clone()),
            Some(_) => {
                tokens.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn revoke_token(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    pub async fn session(&self, wallet: &str) -> Option<WalletAuthSession> {
        self.sessions.read().await.get(wallet).cloned()
    }

    /// Drop expired tokens and stale challenges. Returns (tokens, challenges) removed.
    pub async fn sweep(&self) -> (usize, usize) {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> (usize, usize) {
        let tokens_removed = {
            let mut tokens = self.tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| now < t.expires_at);
            before - tokens.len()
        };

        let sessions_removed = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| s.is_locked(now) || (now < s.expires_at && !s.verified));
            before - sessions.len()
        };

        (tokens_removed, sessions_removed)
    }
}
