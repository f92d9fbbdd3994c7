use super::{ClientError, ClientResult, IdentityClient, SessionState, TaskGateway};
use crate::dto::{
    ErrorBody, HealthResponse, MessageResponse, RegisterResponse, RegisteredUser, SessionResponse,
    SignInRequest, TaskListResponse, TaskResponse, VerifiedUser, VerifyRequest, VerifyResponse,
};
use crate::identity::AuthErrorKind;
use crate::models::{Registration, Session, Task, TaskDraft};
use crate::view::{StatusFilter, TaskFilters};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

/// HTTP client for the app's own API. Task calls carry the current
/// session's bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionState,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionState) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends with the session's bearer token. A 401 means the credential
    /// expired or was revoked, so the session ends here and subscribers
    /// hear about it.
    async fn send_authorized(&self, request: RequestBuilder) -> ClientResult<Response> {
        let token = self.session.token().ok_or(ClientError::Unauthenticated)?;
        let resp = request.bearer_auth(&token).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED && self.session.expire(&token) {
            tracing::info!("credential rejected by the server, session ended");
        }
        Ok(resp)
    }

    // ── Backend account calls ──────────────────────────────────

    /// `POST /auth/register`. Needs no credential.
    pub async fn register_account(&self, registration: &Registration) -> ClientResult<RegisteredUser> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(registration)
            .send()
            .await?;
        let body: RegisterResponse = read(resp).await?;
        Ok(body.user)
    }

    pub async fn verify_token(&self, token: &str) -> ClientResult<VerifiedUser> {
        let resp = self
            .http
            .post(self.url("/auth/verify"))
            .json(&VerifyRequest {
                token: Some(token.to_string()),
            })
            .send()
            .await?;
        let body: VerifyResponse = read(resp).await?;
        Ok(body.user)
    }

    pub async fn delete_account(&self, uid: &str) -> ClientResult<()> {
        let resp = self
            .send_authorized(self.http.delete(self.url(&format!("/auth/delete/{uid}"))))
            .await?;
        let _: MessageResponse = read(resp).await?;
        Ok(())
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let resp = self.http.get(self.url("/health")).send().await?;
        read(resp).await
    }

    // ── Tasks ──────────────────────────────────────────────────

    /// The full listing envelope, including the demo-mode message.
    pub async fn list_tasks(&self, filters: &TaskFilters) -> ClientResult<TaskListResponse> {
        let mut query = vec![
            ("sortBy", filters.sort_by.as_str()),
            ("order", filters.order.as_str()),
        ];
        if let StatusFilter::Only(status) = filters.status {
            query.push(("status", status.as_str()));
        }
        let resp = self.send_authorized(self.http.get(self.url("/tasks")).query(&query)).await?;
        read(resp).await
    }

    pub async fn get_task(&self, id: &str) -> ClientResult<Task> {
        let resp = self.send_authorized(self.http.get(self.url(&format!("/tasks/{id}")))).await?;
        let body: TaskResponse = read(resp).await?;
        Ok(body.task)
    }
}

#[async_trait]
impl TaskGateway for ApiClient {
    async fn list(&self, filters: &TaskFilters) -> ClientResult<Vec<Task>> {
        Ok(self.list_tasks(filters).await?.tasks)
    }

    async fn create(&self, draft: &TaskDraft) -> ClientResult<Task> {
        let resp = self.send_authorized(self.http.post(self.url("/tasks")).json(draft)).await?;
        let body: TaskResponse = read(resp).await?;
        Ok(body.task)
    }

    async fn update(&self, id: &str, draft: &TaskDraft) -> ClientResult<Task> {
        let resp = self
            .send_authorized(self.http.put(self.url(&format!("/tasks/{id}"))).json(draft))
            .await?;
        let body: TaskResponse = read(resp).await?;
        Ok(body.task)
    }

    async fn delete(&self, id: &str) -> ClientResult<()> {
        let resp = self
            .send_authorized(self.http.delete(self.url(&format!("/tasks/{id}"))))
            .await?;
        let _: MessageResponse = read(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityClient for ApiClient {
    async fn sign_up(&self, registration: &Registration) -> ClientResult<Session> {
        let resp = self
            .http
            .post(self.url("/identity/signup"))
            .json(registration)
            .send()
            .await
            .map_err(network_failure)?;
        read_session(resp).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session> {
        let resp = self
            .http
            .post(self.url("/identity/signin"))
            .json(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(network_failure)?;
        read_session(resp).await
    }

    async fn sign_out(&self, token: &str) -> ClientResult<()> {
        let resp = self
            .http
            .post(self.url("/identity/signout"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_failure)?;
        let _: MessageResponse = read(resp).await.map_err(provider_error)?;
        Ok(())
    }

    async fn register(&self, registration: &Registration) -> ClientResult<()> {
        self.register_account(registration).await.map(|_| ())
    }
}

// ── Response handling ──────────────────────────────────────────

async fn read<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let fallback = status.canonical_reason().unwrap_or("Request failed").to_string();
    Err(match resp.json::<ErrorBody>().await {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            error: body.error,
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            error: fallback.clone(),
            message: fallback,
        },
    })
}

async fn read_session(resp: Response) -> ClientResult<Session> {
    let body: SessionResponse = read(resp).await.map_err(provider_error)?;
    Ok(Session {
        token: body.token,
        user: body.user,
    })
}

/// Identity failures come back with the provider code in `error`.
fn provider_error(error: ClientError) -> ClientError {
    match error {
        ClientError::Api { error: code, .. } if code.starts_with("auth/") => {
            ClientError::Auth(AuthErrorKind::from_code(&code))
        }
        ClientError::Transport(_) => ClientError::Auth(AuthErrorKind::NetworkRequestFailed),
        other => other,
    }
}

fn network_failure(error: reqwest::Error) -> ClientError {
    tracing::debug!(%error, "identity request failed");
    ClientError::Auth(AuthErrorKind::NetworkRequestFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_become_auth_errors() {
        let err = provider_error(ClientError::Api {
            status: 401,
            error: "auth/wrong-password".into(),
            message: "whatever the server said".into(),
        });
        assert!(matches!(err, ClientError::Auth(AuthErrorKind::WrongPassword)));

        let err = provider_error(ClientError::Api {
            status: 503,
            error: "Service not available".into(),
            message: "down".into(),
        });
        assert!(err.is_service_unavailable());
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let client = ApiClient::new("http://localhost:5000/api/", SessionState::new());
        assert_eq!(client.url("/tasks"), "http://localhost:5000/api/tasks");
    }

    #[tokio::test]
    async fn task_calls_need_a_session() {
        let client = ApiClient::new("http://localhost:5000/api", SessionState::new());
        let request = client.http.get(client.url("/tasks"));
        assert!(matches!(
            client.send_authorized(request).await,
            Err(ClientError::Unauthenticated)
        ));
    }
}
