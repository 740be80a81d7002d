//! REST surface of the transport boundary. Handlers stay thin: resolve the
//! caller, delegate to the orchestrator or resolver, map domain errors to
//! an HTTP envelope.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use palaver_core::{Connection, Error, Group, GroupId, Message, PageArgs, User, UserId};

use crate::auth::{hash_password, AuthToken};
use crate::pagination;
use crate::state::AppState;
use crate::ws::ws_handler;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:group_id", patch(update_group).delete(delete_group))
        .route("/groups/:group_id/leave", post(leave_group))
        .route("/groups/:group_id/messages", get(group_messages))
        .route("/messages", post(create_message))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Unauthorized => (axum::http::StatusCode::UNAUTHORIZED, "unauthorized", None),
            ApiError::NotFound(msg) => {
                (axum::http::StatusCode::NOT_FOUND, "not_found", Some(msg))
            }
            ApiError::Conflict(msg) => (axum::http::StatusCode::CONFLICT, "conflict", Some(msg)),
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, "bad_request", Some(msg))
            }
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    None,
                )
            }
        };
        (status, Json(ApiErrorBody { error, message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { .. } => ApiError::NotFound(err.to_string()),
            Error::MalformedCursor => ApiError::BadRequest(err.to_string()),
            Error::Unauthorized => ApiError::Unauthorized,
            Error::PartialFailure(msg) => ApiError::Conflict(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub group_id: GroupId,
    pub text: String,
}

async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<AuthResponse> {
    let username = if request.username.trim().is_empty() {
        request.email.clone()
    } else {
        request.username
    };
    let user = state
        .store
        .create_user(&username, &request.email, &hash_password(&request.password))
        .await?;
    let token = state.identity.mint(user.id);
    Ok(Json(AuthResponse { user, token }))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let user = state.login(&request.email, &request.password).await?;
    let token = state.identity.mint(user.id);
    Ok(Json(AuthResponse { user, token }))
}

async fn list_groups(State(state): State<AppState>, token: AuthToken) -> ApiResult<Vec<Group>> {
    let user = state.authed_user(token.as_str()).await?;
    let groups = state.store.groups_for_user(user.id).await?;
    Ok(Json(groups))
}

async fn create_group(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<Group> {
    let user = state.authed_user(token.as_str()).await?;
    let group = state
        .create_group(&request.name, user.id, &request.member_ids)
        .await?;
    Ok(Json(group))
}

async fn update_group(
    State(state): State<AppState>,
    token: AuthToken,
    Path(group_id): Path<GroupId>,
    Json(request): Json<UpdateGroupRequest>,
) -> ApiResult<Group> {
    let user = state.authed_user(token.as_str()).await?;
    require_member(&state, group_id, user.id).await?;
    let group = state.update_group(group_id, &request.name).await?;
    Ok(Json(group))
}

async fn leave_group(
    State(state): State<AppState>,
    token: AuthToken,
    Path(group_id): Path<GroupId>,
) -> ApiResult<serde_json::Value> {
    let user = state.authed_user(token.as_str()).await?;
    require_member(&state, group_id, user.id).await?;
    state.leave_group(group_id, user.id).await?;
    Ok(Json(serde_json::json!({ "left": true })))
}

async fn delete_group(
    State(state): State<AppState>,
    token: AuthToken,
    Path(group_id): Path<GroupId>,
) -> ApiResult<serde_json::Value> {
    let user = state.authed_user(token.as_str()).await?;
    require_member(&state, group_id, user.id).await?;
    state.delete_group(group_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn group_messages(
    State(state): State<AppState>,
    token: AuthToken,
    Path(group_id): Path<GroupId>,
    Query(args): Query<PageArgs>,
) -> ApiResult<Connection> {
    let user = state.authed_user(token.as_str()).await?;
    require_member(&state, group_id, user.id).await?;
    let connection = pagination::page(state.store.as_ref(), group_id, &args).await?;
    Ok(Json(connection))
}

async fn create_message(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<CreateMessageRequest>,
) -> ApiResult<Message> {
    let user = state.authed_user(token.as_str()).await?;
    require_member(&state, request.group_id, user.id).await?;
    let message = state
        .create_message(request.group_id, user.id, &request.text)
        .await?;
    Ok(Json(message))
}

/// Reads against a group are gated on membership; a non-member gets the
/// same answer as a missing token.
async fn require_member(
    state: &AppState,
    group_id: GroupId,
    user_id: UserId,
) -> Result<(), ApiError> {
    let group = state
        .store
        .group(group_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {group_id} not found")))?;
    if group.has_member(user_id) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSigner;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use palaver_bus::NotificationBus;
    use palaver_core::{Cursor, Event, MessageId, Topic};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TokenSigner::new("route-test-secret".as_bytes().to_vec())),
            Arc::new(NotificationBus::new()),
        )
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_authed(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn signup_user(app: &Router, name: &str) -> (i64, String) {
        let (status, body) = call(
            app,
            post_json(
                "/signup",
                None,
                json!({
                    "username": name,
                    "email": format!("{name}@example.com"),
                    "password": "pw",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["user"]["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn signup_login_and_group_flow() {
        let app = build_router(test_state());
        let (ana_id, ana_token) = signup_user(&app, "ana").await;
        let (bob_id, bob_token) = signup_user(&app, "bob").await;

        let (status, group) = call(
            &app,
            post_json(
                "/groups",
                Some(&ana_token),
                json!({ "name": "pair", "member_ids": [bob_id] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(group["creator_id"].as_i64().unwrap(), ana_id);

        let (status, groups) = call(&app, get_authed("/groups", &bob_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(groups.as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            post_json(
                "/login",
                None,
                json!({ "email": "ana@example.com", "password": "pw" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"].as_i64().unwrap(), ana_id);

        let (status, _) = call(
            &app,
            post_json(
                "/login",
                None,
                json!({ "email": "ana@example.com", "password": "wrong" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("GET")
            .uri("/groups")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_message_persists_and_publishes() {
        let state = test_state();
        let app = build_router(state.clone());
        let (_, ana_token) = signup_user(&app, "ana").await;
        let (bob_id, _) = signup_user(&app, "bob").await;

        let (_, group) = call(
            &app,
            post_json(
                "/groups",
                Some(&ana_token),
                json!({ "name": "pair", "member_ids": [bob_id] }),
            ),
        )
        .await;
        let group_id = group["id"].as_i64().unwrap();

        let mut feed = state.bus.subscribe(
            Topic::MessageAdded,
            palaver_bus::MessageAddedFilter::new(
                UserId(bob_id),
                [GroupId(group_id)],
                state.membership(),
            ),
        );

        let (status, message) = call(
            &app,
            post_json(
                "/messages",
                Some(&ana_token),
                json!({ "group_id": group_id, "text": "hello" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let message_id = message["id"].as_i64().unwrap();

        match feed.recv().await {
            Some(Event::MessageAdded { message }) => assert_eq!(message.id.0, message_id),
            other => panic!("expected bus delivery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pagination_scenario_over_http() {
        let app = build_router(test_state());
        let (_, token) = signup_user(&app, "ana").await;

        // Sibling group soaks up ids 1..=4 so the main group holds 5..=10.
        let (_, filler) = call(
            &app,
            post_json("/groups", Some(&token), json!({ "name": "filler" })),
        )
        .await;
        for n in 0..4 {
            call(
                &app,
                post_json(
                    "/messages",
                    Some(&token),
                    json!({ "group_id": filler["id"], "text": format!("filler {n}") }),
                ),
            )
            .await;
        }
        let (_, group) = call(
            &app,
            post_json("/groups", Some(&token), json!({ "name": "main" })),
        )
        .await;
        let group_id = group["id"].as_i64().unwrap();
        for n in 0..6 {
            call(
                &app,
                post_json(
                    "/messages",
                    Some(&token),
                    json!({ "group_id": group_id, "text": format!("msg {n}") }),
                ),
            )
            .await;
        }

        let (status, body) = call(
            &app,
            get_authed(&format!("/groups/{group_id}/messages?first=3"), &token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = body["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["node"]["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![10, 9, 8]);
        assert_eq!(body["page_info"]["has_next_page"], json!(true));

        let after = Cursor::encode(MessageId(8));
        let (status, body) = call(
            &app,
            get_authed(
                &format!("/groups/{group_id}/messages?first=3&after={after}"),
                &token,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = body["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["node"]["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![7, 6, 5]);
        assert_eq!(body["page_info"]["has_next_page"], json!(false));
    }

    #[tokio::test]
    async fn malformed_cursor_is_a_bad_request() {
        let app = build_router(test_state());
        let (_, token) = signup_user(&app, "ana").await;
        let (_, group) = call(
            &app,
            post_json("/groups", Some(&token), json!({ "name": "solo" })),
        )
        .await;
        let group_id = group["id"].as_i64().unwrap();

        let (status, body) = call(
            &app,
            get_authed(
                &format!("/groups/{group_id}/messages?first=3&after=%21%21%21"),
                &token,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("bad_request"));
    }

    #[tokio::test]
    async fn non_members_cannot_read_or_post() {
        let app = build_router(test_state());
        let (_, ana_token) = signup_user(&app, "ana").await;
        let (_, mallory_token) = signup_user(&app, "mallory").await;

        let (_, group) = call(
            &app,
            post_json("/groups", Some(&ana_token), json!({ "name": "private" })),
        )
        .await;
        let group_id = group["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            get_authed(&format!("/groups/{group_id}/messages"), &mallory_token),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            post_json(
                "/messages",
                Some(&mallory_token),
                json!({ "group_id": group_id, "text": "let me in" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            get_authed("/groups/404/messages", &ana_token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn leave_and_delete_lifecycle() {
        let app = build_router(test_state());
        let (_, ana_token) = signup_user(&app, "ana").await;
        let (bob_id, bob_token) = signup_user(&app, "bob").await;

        let (_, group) = call(
            &app,
            post_json(
                "/groups",
                Some(&ana_token),
                json!({ "name": "pair", "member_ids": [bob_id] }),
            ),
        )
        .await;
        let group_id = group["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            post_json(
                &format!("/groups/{group_id}/leave"),
                Some(&bob_token),
                json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Bob is no longer a member, so even reads are rejected now.
        let (status, _) = call(
            &app,
            get_authed(&format!("/groups/{group_id}/messages"), &bob_token),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/groups/{group_id}"))
            .header("authorization", format!("Bearer {ana_token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            get_authed(&format!("/groups/{group_id}/messages"), &ana_token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
