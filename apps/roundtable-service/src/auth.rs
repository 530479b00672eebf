use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use roundtable_domain::Principal;

use crate::config::Config;

/// Session lookup for the API layer. Issuance is the mock email-code flow;
/// everything scoped consumes only `resolve_access_token`, which either
/// yields a principal or fails before any store access happens.
#[derive(Clone)]
pub struct AuthService {
    state: Arc<RwLock<AuthState>>,
    path: Option<PathBuf>,
    mock_magic_code: String,
    challenge_ttl: Duration,
    access_ttl: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AuthState {
    challenges: HashMap<String, PendingChallenge>,
    users_by_id: HashMap<String, UserRecord>,
    users_by_email: HashMap<String, String>,
    sessions_by_token_hash: HashMap<String, SessionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingChallenge {
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: String,
    email: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    session_id: String,
    user_id: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionBundle {
    pub user: AuthUser,
    pub session: SessionView,
}

impl SessionBundle {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.user.id.clone(),
            email: self.user.email.clone(),
            name: self.user.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeResult {
    pub challenge_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub user: AuthUser,
    pub token_type: &'static str,
    pub access_token: String,
    pub session: SessionView,
    pub new_user: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthorized,
    #[error("email must not be empty and must contain '@'")]
    InvalidEmail,
    #[error("challenge is unknown or expired")]
    UnknownChallenge,
    #[error("verification code is invalid")]
    InvalidCode,
    #[error("{message}")]
    Persistence { message: String },
}

impl AuthService {
    pub fn from_config(config: &Config) -> Self {
        let path = config.auth_store_path.clone();
        let state = Self::load_state(path.as_ref());
        Self {
            state: Arc::new(RwLock::new(state)),
            path,
            mock_magic_code: config.mock_magic_code.clone(),
            challenge_ttl: Duration::seconds(config.auth_challenge_ttl_seconds as i64),
            access_ttl: Duration::seconds(config.auth_access_ttl_seconds as i64),
        }
    }

    pub async fn begin_email_challenge(&self, email: &str) -> Result<ChallengeResult, AuthError> {
        let email = normalize_email(email)?;
        let challenge_ttl = self.challenge_ttl;

        self.mutate(move |state| {
            let now = Utc::now();
            let challenge_id = format!("ch_{}", Uuid::new_v4().simple());
            let expires_at = now + challenge_ttl;
            state.challenges.retain(|_, challenge| challenge.expires_at > now);
            state.challenges.insert(
                challenge_id.clone(),
                PendingChallenge {
                    email: email.clone(),
                    expires_at,
                },
            );
            Ok(ChallengeResult {
                challenge_id,
                email,
                expires_at,
            })
        })
        .await
    }

    pub async fn verify_email_code(
        &self,
        challenge_id: &str,
        code: &str,
    ) -> Result<VerifyResult, AuthError> {
        if code.trim() != self.mock_magic_code {
            return Err(AuthError::InvalidCode);
        }
        let challenge_id = challenge_id.trim().to_string();
        let access_ttl = self.access_ttl;

        self.mutate(move |state| {
            let now = Utc::now();
            let challenge = state
                .challenges
                .remove(&challenge_id)
                .filter(|challenge| challenge.expires_at > now)
                .ok_or(AuthError::UnknownChallenge)?;

            let (user, new_user) = match state.users_by_email.get(&challenge.email) {
                Some(user_id) => {
                    let user = state
                        .users_by_id
                        .get(user_id)
                        .cloned()
                        .ok_or(AuthError::UnknownChallenge)?;
                    (user, false)
                }
                None => {
                    let user = UserRecord {
                        id: format!("user_{}", Uuid::new_v4().simple()),
                        email: challenge.email.clone(),
                        name: display_name_from_email(&challenge.email),
                    };
                    state
                        .users_by_email
                        .insert(user.email.clone(), user.id.clone());
                    state.users_by_id.insert(user.id.clone(), user.clone());
                    (user, true)
                }
            };

            let access_token = format!("rt_at_{}", Uuid::new_v4().simple());
            let session = SessionRecord {
                session_id: format!("sess_{}", Uuid::new_v4().simple()),
                user_id: user.id.clone(),
                issued_at: now,
                expires_at: now + access_ttl,
            };
            state
                .sessions_by_token_hash
                .insert(sha256_hex(access_token.as_bytes()), session.clone());

            Ok(VerifyResult {
                user: AuthUser {
                    id: user.id,
                    email: user.email,
                    name: user.name,
                },
                token_type: "Bearer",
                access_token,
                session: SessionView {
                    session_id: session.session_id,
                    issued_at: session.issued_at,
                    expires_at: session.expires_at,
                },
                new_user,
            })
        })
        .await
    }

    pub async fn resolve_access_token(&self, access_token: &str) -> Result<SessionBundle, AuthError> {
        let token_hash = sha256_hex(access_token.trim().as_bytes());
        let state = self.state.read().await;
        let session = state
            .sessions_by_token_hash
            .get(&token_hash)
            .ok_or(AuthError::Unauthorized)?;
        if session.expires_at <= Utc::now() {
            return Err(AuthError::Unauthorized);
        }
        let user = state
            .users_by_id
            .get(&session.user_id)
            .ok_or(AuthError::Unauthorized)?;

        Ok(SessionBundle {
            user: AuthUser {
                id: user.id.clone(),
                email: user.email.clone(),
                name: user.name.clone(),
            },
            session: SessionView {
                session_id: session.session_id.clone(),
                issued_at: session.issued_at,
                expires_at: session.expires_at,
            },
        })
    }

    fn load_state(path: Option<&PathBuf>) -> AuthState {
        let Some(path) = path else {
            return AuthState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return AuthState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "roundtable.auth",
                    path = %path.display(),
                    error = %error,
                    "failed to read auth store; booting with empty state",
                );
                return AuthState::default();
            }
        };

        match serde_json::from_str::<AuthState>(&raw) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    target: "roundtable.auth",
                    path = %path.display(),
                    error = %error,
                    "failed to parse auth store; booting with empty state",
                );
                AuthState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &AuthState) -> Result<(), AuthError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| AuthError::Persistence {
                    message: format!("failed to prepare auth store directory: {error}"),
                })?;
        }

        let payload = serde_json::to_vec(snapshot).map_err(|error| AuthError::Persistence {
            message: format!("failed to encode auth store payload: {error}"),
        })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| AuthError::Persistence {
                message: format!("failed to write auth store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|error| AuthError::Persistence {
                message: format!("failed to finalize auth store payload: {error}"),
            })?;

        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: FnOnce(&mut AuthState) -> Result<T, AuthError>,
    {
        let (result, snapshot) = {
            let mut state = self.state.write().await;
            let result = operation(&mut state)?;
            (result, state.clone())
        };

        self.persist_state(&snapshot).await?;
        Ok(result)
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

fn display_name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("member")
        .to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
