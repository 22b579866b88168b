use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::backend::{SessionBackend, SessionDetail, SessionPage};
use crate::error::SessionApiError;
use crate::schema::{
    AddMessageRequest, ApiEnvelope, CreateSessionRequest, DeleteResponse, Session,
    SessionDetailResponse, SessionListResponse, StoredMessage, UpdateSessionRequest,
};

/// Page size used when listing sessions.
pub const DEFAULT_PAGE_SIZE: usize = 20;

const SESSIONS_PATH: &str = "/api/sessions";

/// REST client for the `/api/sessions` endpoints.
#[derive(Debug, Clone)]
pub struct SessionApiClient {
    http: Client,
    base_url: String,
}

impl SessionApiClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, SessionApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SessionApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|source| SessionApiError::request("building HTTP client", source))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sessions_url(&self) -> String {
        format!("{}{SESSIONS_PATH}", self.base_url)
    }

    fn session_url(&self, id: &str) -> String {
        format!("{}{SESSIONS_PATH}/{id}", self.base_url)
    }

    async fn execute<T>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, SessionApiError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| SessionApiError::request(operation, source))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| SessionApiError::request(operation, source))?;

        if !status.is_success() {
            return Err(SessionApiError::Status {
                operation,
                status,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| SessionApiError::decode(operation, source))
    }
}

#[async_trait]
impl SessionBackend for SessionApiClient {
    async fn list_sessions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<SessionPage, SessionApiError> {
        const OPERATION: &str = "listing sessions";
        let request = self
            .http
            .get(self.sessions_url())
            .query(&[("limit", limit), ("offset", offset)]);
        let response: SessionListResponse = self.execute(OPERATION, request).await?;
        if let Some(message) = response.rejection() {
            return Err(SessionApiError::rejected(OPERATION, message));
        }

        Ok(SessionPage {
            sessions: response.sessions,
            total: response.total,
        })
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, SessionApiError> {
        const OPERATION: &str = "creating session";
        let builder = self.http.post(self.sessions_url()).json(request);
        let response: ApiEnvelope<Session> = self.execute(OPERATION, builder).await?;
        if let Some(message) = response.rejection() {
            return Err(SessionApiError::rejected(OPERATION, message));
        }

        response
            .data
            .ok_or_else(|| SessionApiError::rejected(OPERATION, "response carried no session"))
    }

    async fn get_session(&self, id: &str) -> Result<SessionDetail, SessionApiError> {
        const OPERATION: &str = "loading session";
        let request = self.http.get(self.session_url(id));
        let response: SessionDetailResponse = self.execute(OPERATION, request).await?;
        if let Some(message) = response.rejection() {
            return Err(SessionApiError::rejected(OPERATION, message));
        }

        let session = response
            .session
            .ok_or_else(|| SessionApiError::rejected(OPERATION, "response carried no session"))?;
        Ok(SessionDetail {
            session,
            messages: response.messages,
        })
    }

    async fn update_session(
        &self,
        id: &str,
        request: &UpdateSessionRequest,
    ) -> Result<Option<Session>, SessionApiError> {
        const OPERATION: &str = "updating session";
        let builder = self.http.put(self.session_url(id)).json(request);
        let response: ApiEnvelope<Session> = self.execute(OPERATION, builder).await?;
        if let Some(message) = response.rejection() {
            return Err(SessionApiError::rejected(OPERATION, message));
        }
        Ok(response.data)
    }

    async fn delete_session(&self, id: &str) -> Result<(), SessionApiError> {
        const OPERATION: &str = "deleting session";
        let request = self.http.delete(self.session_url(id));
        let response: DeleteResponse = self.execute(OPERATION, request).await?;
        match response.rejection() {
            Some(message) => Err(SessionApiError::rejected(OPERATION, message)),
            None => Ok(()),
        }
    }

    async fn add_message(
        &self,
        session_id: &str,
        request: &AddMessageRequest,
    ) -> Result<Option<StoredMessage>, SessionApiError> {
        const OPERATION: &str = "saving message";
        let url = format!("{}/messages", self.session_url(session_id));
        let builder = self.http.post(url).json(request);
        let response: ApiEnvelope<StoredMessage> = self.execute(OPERATION, builder).await?;
        if let Some(message) = response.rejection() {
            return Err(SessionApiError::rejected(OPERATION, message));
        }
        Ok(response.data)
    }
}
