//! Client half: request layer, session state and the task board.
//!
//! Nothing in here talks to redb or the identity provider directly; every
//! call goes through the HTTP API via one of the two async seams below.

pub mod api;
pub mod board;
pub mod session;

pub use api::ApiClient;
pub use board::{BoardPhase, TaskBoard};
pub use session::{AuthBridge, SessionState, Subscription};

use crate::identity::AuthErrorKind;
use crate::models::{Registration, Session, Task, TaskDraft};
use crate::validation::Validation;
use crate::view::TaskFilters;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(Validation),
    #[error("{}", .0.message())]
    Auth(AuthErrorKind),
    #[error("{message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },
    #[error("Network error. Please check your internet connection.")]
    Transport(String),
    #[error("User not authenticated")]
    Unauthenticated,
    #[error("Another operation is still in progress")]
    Busy,
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_service_unavailable(&self) -> bool {
        self.status() == Some(503)
    }
}

impl From<Validation> for ClientError {
    fn from(validation: Validation) -> Self {
        ClientError::Validation(validation)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        ClientError::Transport(error.to_string())
    }
}

/// The app's own task API, as the board sees it.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list(&self, filters: &TaskFilters) -> ClientResult<Vec<Task>>;
    async fn create(&self, draft: &TaskDraft) -> ClientResult<Task>;
    async fn update(&self, id: &str, draft: &TaskDraft) -> ClientResult<Task>;
    async fn delete(&self, id: &str) -> ClientResult<()>;
}

/// The identity provider, plus the backend registration that follows a
/// sign-up.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn sign_up(&self, registration: &Registration) -> ClientResult<Session>;
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session>;
    async fn sign_out(&self, token: &str) -> ClientResult<()>;
    async fn register(&self, registration: &Registration) -> ClientResult<()>;
}
