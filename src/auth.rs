//! Doctor accounts and bearer-token sessions.
//!
//! Passwords are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with
//! base64 salt and hash. Sessions live in memory only and are lost on restart.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AuthConfig, MAX_SESSION_TTL_SECS};
use crate::storage::doctors::{self, Doctor};
use crate::storage::{RecordStore, StorageError};

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,

    #[error("username already registered: {0}")]
    UsernameTaken(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthorized,

    #[error("stored password hash is malformed")]
    MalformedHash,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("session lock poisoned")]
    LockPoisoned,
}

/// A logged-in doctor.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub doctor_id: i64,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Registers doctors, checks passwords and tracks live sessions.
#[derive(Debug, Clone)]
pub struct AuthService {
    store: Arc<RecordStore>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    session_ttl: Duration,
    iterations: u32,
    // Verified against for unknown usernames so a miss costs a full hash.
    dummy_hash: Arc<OnceLock<String>>,
}

impl AuthService {
    pub fn new(store: Arc<RecordStore>, config: &AuthConfig) -> Self {
        AuthService {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: Duration::seconds(
                i64::try_from(config.session_ttl_secs.min(MAX_SESSION_TTL_SECS)).unwrap_or_default(),
            ),
            iterations: config.pbkdf2_iterations,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<Doctor, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let hash = hash_password(password, self.iterations);
        let doctor = self
            .store
            .with_conn(|conn| doctors::insert_doctor(conn, username, &hash))
            .map_err(|e| match e {
                StorageError::ConstraintViolation(_) => AuthError::UsernameTaken(username.to_string()),
                other => AuthError::Storage(other),
            })?;
        tracing::info!(username = %doctor.username, "doctor registered");
        Ok(doctor)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = username.trim();
        let doctor = self
            .store
            .with_conn(|conn| doctors::find_doctor_by_username(conn, username))?;

        let verified = match &doctor {
            Some(doctor) => verify_password(password, &doctor.password_hash)?,
            None => {
                let dummy = self.dummy_hash.get_or_init(|| hash_password("", self.iterations));
                verify_password(password, dummy)?;
                false
            }
        };
        let doctor = match doctor {
            Some(doctor) if verified => doctor,
            _ => {
                tracing::warn!(username, "login failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let session = Session {
            token: Uuid::new_v4().to_string(),
            doctor_id: doctor.id,
            username: doctor.username,
            expires_at: Utc::now() + self.session_ttl,
        };
        self.sessions
            .write()
            .map_err(|_| AuthError::LockPoisoned)?
            .insert(session.token.clone(), session.clone());
        tracing::info!(username = %session.username, "login successful");
        Ok(session)
    }

    pub fn logout(&self, token: &str) -> Result<(), AuthError> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| AuthError::LockPoisoned)?
            .remove(token);
        if let Some(session) = removed {
            tracing::info!(username = %session.username, "logged out");
        }
        Ok(())
    }

    /// Resolve a bearer token, dropping it if it has expired.
    pub fn authenticate(&self, token: &str) -> Result<Session, AuthError> {
        let mut sessions = self.sessions.write().map_err(|_| AuthError::LockPoisoned)?;
        match sessions.get(token) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(AuthError::Unauthorized)
            }
            None => Err(AuthError::Unauthorized),
        }
    }
}

pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, iterations);
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        BASE64.encode(salt),
        BASE64.encode(hash)
    )
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedHash);
    };
    let iterations = iterations
        .parse::<u32>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or(AuthError::MalformedHash)?;
    let salt = BASE64.decode(salt).map_err(|_| AuthError::MalformedHash)?;
    let expected = BASE64.decode(expected).map_err(|_| AuthError::MalformedHash)?;

    let actual = derive(password, &salt, iterations);
    Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}
