//! Asynchronous client for the Palaver REST API.
//!
//! Thin wrappers over the server endpoints: auth token handling, JSON
//! encoding, and status checking live here so callers deal only in the
//! domain types from `palaver-core`.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use palaver_core::{Connection, Group, GroupId, Message, PageArgs, User, UserId};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Clone)]
pub struct PalaverClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignupBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateGroupBody<'a> {
    name: &'a str,
    member_ids: &'a [UserId],
}

#[derive(Debug, Serialize)]
struct UpdateGroupBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    group_id: GroupId,
    text: &'a str,
}

/// Server response for signup and login.
#[derive(Debug, serde::Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

impl PalaverClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token: Some(token.into()),
        }
    }

    /// Register a new account and keep the returned token for later calls.
    pub async fn signup(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError> {
        let session: AuthSession = self
            .execute(self.http.post(self.url("/signup")).json(&SignupBody {
                username,
                email,
                password,
            }))
            .await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Exchange credentials for a token and keep it for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let session: AuthSession = self
            .execute(
                self.http
                    .post(self.url("/login"))
                    .json(&LoginBody { email, password }),
            )
            .await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Groups the authenticated user belongs to.
    pub async fn groups(&self) -> Result<Vec<Group>, ClientError> {
        self.execute(self.http.get(self.url("/groups"))).await
    }

    pub async fn create_group(
        &self,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<Group, ClientError> {
        self.execute(
            self.http
                .post(self.url("/groups"))
                .json(&CreateGroupBody { name, member_ids }),
        )
        .await
    }

    pub async fn update_group(&self, group_id: GroupId, name: &str) -> Result<Group, ClientError> {
        self.execute(
            self.http
                .patch(self.url(&format!("/groups/{group_id}")))
                .json(&UpdateGroupBody { name }),
        )
        .await
    }

    pub async fn leave_group(&self, group_id: GroupId) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .execute(self.http.post(self.url(&format!("/groups/{group_id}/leave"))))
            .await?;
        Ok(())
    }

    pub async fn delete_group(&self, group_id: GroupId) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .execute(self.http.delete(self.url(&format!("/groups/{group_id}"))))
            .await?;
        Ok(())
    }

    /// One page of a group's messages, newest first.
    pub async fn messages(
        &self,
        group_id: GroupId,
        args: &PageArgs,
    ) -> Result<Connection, ClientError> {
        self.execute(
            self.http
                .get(self.url(&format!("/groups/{group_id}/messages")))
                .query(args),
        )
        .await
    }

    pub async fn create_message(
        &self,
        group_id: GroupId,
        text: &str,
    ) -> Result<Message, ClientError> {
        self.execute(
            self.http
                .post(self.url("/messages"))
                .json(&CreateMessageBody { group_id, text }),
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute<T>(&self, request: RequestBuilder) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let res = request.send().await?;

        if res.status().is_success() {
            Ok(res.json::<T>().await?)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(ClientError::UnexpectedStatus { status, body })
        }
    }
}
