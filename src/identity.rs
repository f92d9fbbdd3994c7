//! Identity provider: accounts, passwords and bearer credentials.
//!
//! `IdentityProvider` is the seam the HTTP layer talks to. `LocalIdentity`
//! keeps accounts in the redb save file, hashes passwords with argon2 and
//! issues HS256 JWTs.

use crate::models::{Registration, Session, SessionUser};
use crate::persist::{SaveFile, UserRecord};
use crate::store::StoreError;
use crate::validation::{is_plausible_email, PASSWORD_MIN};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

pub const MAX_FAILED_SIGN_INS: u32 = 5;
pub const FAILED_SIGN_IN_WINDOW_MINUTES: i64 = 15;

// ── Error kinds ────────────────────────────────────────────────

/// Every failure the identity provider reports, as a closed set.
/// Unknown provider codes land in `Other` and get the generic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    TooManyRequests,
    NetworkRequestFailed,
    Other(String),
}

impl AuthErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/email-already-in-use" | "auth/email-already-exists" => {
                AuthErrorKind::EmailAlreadyInUse
            }
            "auth/invalid-email" => AuthErrorKind::InvalidEmail,
            "auth/weak-password" => AuthErrorKind::WeakPassword,
            "auth/user-not-found" => AuthErrorKind::UserNotFound,
            "auth/wrong-password" => AuthErrorKind::WrongPassword,
            "auth/invalid-credential" => AuthErrorKind::InvalidCredential,
            "auth/too-many-requests" => AuthErrorKind::TooManyRequests,
            "auth/network-request-failed" => AuthErrorKind::NetworkRequestFailed,
            other => AuthErrorKind::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AuthErrorKind::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthErrorKind::InvalidEmail => "auth/invalid-email",
            AuthErrorKind::WeakPassword => "auth/weak-password",
            AuthErrorKind::UserNotFound => "auth/user-not-found",
            AuthErrorKind::WrongPassword => "auth/wrong-password",
            AuthErrorKind::InvalidCredential => "auth/invalid-credential",
            AuthErrorKind::TooManyRequests => "auth/too-many-requests",
            AuthErrorKind::NetworkRequestFailed => "auth/network-request-failed",
            AuthErrorKind::Other(code) => code,
        }
    }

    /// User-facing text. `Other` is the default branch for codes this
    /// build does not know about.
    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::EmailAlreadyInUse => {
                "This email is already registered. Please use a different email or sign in."
            }
            AuthErrorKind::InvalidEmail => "Invalid email address. Please check your email.",
            AuthErrorKind::WeakPassword => "Password is too weak. Please use at least 6 characters.",
            AuthErrorKind::UserNotFound => "No account found with this email. Please sign up first.",
            AuthErrorKind::WrongPassword => "Incorrect password. Please try again.",
            AuthErrorKind::InvalidCredential => {
                "Invalid email or password. Please check your credentials."
            }
            AuthErrorKind::TooManyRequests => "Too many failed attempts. Please try again later.",
            AuthErrorKind::NetworkRequestFailed => {
                "Network error. Please check your internet connection."
            }
            AuthErrorKind::Other(_) => "An error occurred. Please try again.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{}", .0.message())]
    Auth(AuthErrorKind),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl From<AuthErrorKind> for IdentityError {
    fn from(kind: AuthErrorKind) -> Self {
        IdentityError::Auth(kind)
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

// ── Provider seam ──────────────────────────────────────────────

pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    fn sign_up(&self, registration: &Registration) -> IdentityResult<Session>;

    fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session>;

    /// Revoke `token`. Later `verify` calls with it fail.
    fn sign_out(&self, token: &str) -> IdentityResult<()>;

    /// Check signature and expiry; returns the subject.
    fn verify(&self, token: &str) -> IdentityResult<SessionUser>;

    /// Privileged account creation, no session issued.
    fn create_account(&self, registration: &Registration) -> IdentityResult<SessionUser>;

    /// Privileged account removal. False if the account did not exist.
    fn delete_account(&self, uid: &str) -> IdentityResult<bool>;
}

// ── JWT ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Copy)]
struct FailedSignIns {
    count: u32,
    first_at: chrono::DateTime<Utc>,
}

// ── Local provider ─────────────────────────────────────────────

pub struct LocalIdentity {
    save_file: SaveFile,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    failed: Mutex<HashMap<String, FailedSignIns>>,
    /// Revoked token ids → their expiry, pruned on every sign-out.
    revoked: RwLock<HashMap<String, usize>>,
}

impl LocalIdentity {
    pub fn new(save_file: SaveFile, secret: &str, ttl_minutes: i64) -> Self {
        LocalIdentity {
            save_file,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
            failed: Mutex::new(HashMap::new()),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    fn issue(&self, user: &UserRecord) -> IdentityResult<Session> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.uid.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            jti: Uuid::new_v4().to_string(),
            exp: (now + self.ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| IdentityError::Internal(e.to_string()))?;
        Ok(Session {
            token,
            user: session_user(user),
        })
    }

    fn decode_claims(&self, token: &str) -> IdentityResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }

    fn throttled(&self, email: &str) -> bool {
        let Ok(failed) = self.failed.lock() else {
            return false;
        };
        failed.get(email).is_some_and(|entry| {
            entry.count >= MAX_FAILED_SIGN_INS
                && Utc::now() - entry.first_at < Duration::minutes(FAILED_SIGN_IN_WINDOW_MINUTES)
        })
    }

    fn record_failure(&self, email: &str) {
        if let Ok(mut failed) = self.failed.lock() {
            let now = Utc::now();
            let entry = failed.entry(email.to_string()).or_insert(FailedSignIns {
                count: 0,
                first_at: now,
            });
            if now - entry.first_at >= Duration::minutes(FAILED_SIGN_IN_WINDOW_MINUTES) {
                *entry = FailedSignIns { count: 0, first_at: now };
            }
            entry.count += 1;
        }
    }

    fn clear_failures(&self, email: &str) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.remove(email);
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn sign_up(&self, registration: &Registration) -> IdentityResult<Session> {
        let user = create_record(&self.save_file, registration)?;
        tracing::info!(uid = %user.uid, "account created");
        self.issue(&user)
    }

    fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(AuthErrorKind::InvalidEmail.into());
        }
        if self.throttled(&email) {
            tracing::warn!(%email, "sign-in throttled");
            return Err(AuthErrorKind::TooManyRequests.into());
        }

        let Some(user) = self.save_file.get_user_by_email(&email)? else {
            return Err(AuthErrorKind::UserNotFound.into());
        };
        if !verify_password(password, &user.password_hash) {
            self.record_failure(&email);
            return Err(AuthErrorKind::WrongPassword.into());
        }

        self.clear_failures(&email);
        tracing::info!(uid = %user.uid, "signed in");
        self.issue(&user)
    }

    fn sign_out(&self, token: &str) -> IdentityResult<()> {
        let claims = self.decode_claims(token)?;
        let now = Utc::now().timestamp() as usize;
        let mut revoked = self
            .revoked
            .write()
            .map_err(|_| IdentityError::Internal("revocation list poisoned".into()))?;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti, claims.exp);
        tracing::info!(uid = %claims.sub, "signed out");
        Ok(())
    }

    fn verify(&self, token: &str) -> IdentityResult<SessionUser> {
        let claims = self.decode_claims(token)?;
        let is_revoked = self
            .revoked
            .read()
            .map_err(|_| IdentityError::Internal("revocation list poisoned".into()))?
            .contains_key(&claims.jti);
        if is_revoked {
            return Err(IdentityError::InvalidToken("token has been revoked".into()));
        }

        let user = self
            .save_file
            .get_user(&claims.sub)?
            .ok_or_else(|| IdentityError::InvalidToken("account no longer exists".into()))?;
        Ok(session_user(&user))
    }

    fn create_account(&self, registration: &Registration) -> IdentityResult<SessionUser> {
        let user = create_record(&self.save_file, registration)?;
        tracing::info!(uid = %user.uid, "account registered");
        Ok(session_user(&user))
    }

    fn delete_account(&self, uid: &str) -> IdentityResult<bool> {
        let deleted = self.save_file.delete_user(uid)?;
        if deleted {
            tracing::info!(%uid, "account deleted");
        }
        Ok(deleted)
    }
}

// ── Helpers ────────────────────────────────────────────────────

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn session_user(user: &UserRecord) -> SessionUser {
    SessionUser {
        uid: user.uid.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        email_verified: user.email_verified,
    }
}

fn create_record(save_file: &SaveFile, registration: &Registration) -> IdentityResult<UserRecord> {
    let email = normalize_email(&registration.email);
    if !is_plausible_email(&email) {
        return Err(AuthErrorKind::InvalidEmail.into());
    }
    if registration.password.chars().count() < PASSWORD_MIN {
        return Err(AuthErrorKind::WeakPassword.into());
    }

    let user = UserRecord {
        uid: Uuid::new_v4().to_string(),
        email,
        display_name: registration
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from),
        password_hash: hash_password(&registration.password)?,
        email_verified: false,
        created_at_ms: save_file.clock().now().timestamp_millis(),
    };

    if !save_file.create_user(&user)? {
        return Err(AuthErrorKind::EmailAlreadyInUse.into());
    }
    Ok(user)
}

fn hash_password(password: &str) -> IdentityResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Internal(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
