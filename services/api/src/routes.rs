//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, rejection::JsonRejection},
    middleware,
    response::IntoResponse,
    routing::{get, patch},
};
use common::{response::ApiResponse, upload::StagedFile};
use serde_json::json;
use std::path::Path as FsPath;

use crate::{
    error::ApiResult,
    middleware::{AuthUser, Viewer, auth_middleware, optional_auth_middleware},
    models::UpdateAccountRequest,
    state::AppState,
};

/// Upper bound for a single image upload
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/users/me", get(current_user).patch(update_account))
        .route("/users/me/avatar", patch(update_avatar))
        .route("/users/me/cover-image", patch(update_cover_image))
        .route("/users/me/history", get(watch_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let channel_routes = Router::new()
        .route("/channels/:username", get(channel_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .merge(channel_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Stage the first non-empty file part named `field_name`
async fn staged_file(
    upload_dir: &FsPath,
    multipart: &mut Multipart,
    field_name: &str,
) -> ApiResult<Option<StagedFile>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            continue;
        }
        return Ok(Some(
            StagedFile::write(upload_dir, file_name.as_deref(), &bytes).await?,
        ));
    }
    Ok(None)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

/// Get the authenticated user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state.accounts.current_user(user.id).await?;

    Ok(Json(ApiResponse::new(
        200,
        user,
        "Current user fetched successfully",
    )))
}

/// Update full name and email
pub async fn update_account(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let user = state
        .accounts
        .update_account_details(user.id, &payload.full_name, &payload.email)
        .await?;

    Ok(Json(ApiResponse::new(
        200,
        user,
        "Account details updated successfully",
    )))
}

/// Replace the avatar from the `avatar` file part
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let file = staged_file(&state.upload_dir, &mut multipart, "avatar").await?;
    let user = state.accounts.update_avatar(user.id, file).await?;

    Ok(Json(ApiResponse::new(
        200,
        user,
        "Avatar image updated successfully",
    )))
}

/// Replace the cover image from the `coverImage` file part
pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let file = staged_file(&state.upload_dir, &mut multipart, "coverImage").await?;
    let user = state.accounts.update_cover_image(user.id, file).await?;

    Ok(Json(ApiResponse::new(
        200,
        user,
        "Cover image updated successfully",
    )))
}

/// Watch history of the authenticated user
pub async fn watch_history(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let history = state.aggregator.watch_history(user.id).await?;

    Ok(Json(ApiResponse::new(
        200,
        history,
        "Watch history fetched successfully",
    )))
}

/// Channel profile, with `isSubscribed` relative to the caller if any
pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(Viewer(viewer)): Extension<Viewer>,
    Path(username): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.aggregator.channel_profile(&username, viewer).await?;

    Ok(Json(ApiResponse::new(
        200,
        profile,
        "User channel fetched successfully",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{account::AccountService, aggregator::RelationshipAggregator};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use common::{
        access::AccessGuard,
        mock::{MemoryRelationStore, MemoryUserStore, StaticUploader},
        token::{TokenCodec, TokenConfig},
        users::{NewUser, User, UserStore},
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        codec: TokenCodec,
        users: MemoryUserStore,
        relations: MemoryRelationStore,
    }

    impl TestApp {
        fn new() -> Self {
            let config = TokenConfig {
                access_secret: "access-secret".to_string(),
                refresh_secret: "refresh-secret".to_string(),
                access_token_expiry: 60,
                refresh_token_expiry: 600,
            };
            let codec = TokenCodec::new(&config);
            let users = MemoryUserStore::new();
            let relations = MemoryRelationStore::new(users.clone());

            let state = AppState {
                guard: AccessGuard::new(codec.clone(), Arc::new(users.clone())),
                accounts: AccountService::new(
                    Arc::new(users.clone()),
                    Arc::new(StaticUploader::new("https://cdn.example.com")),
                ),
                aggregator: RelationshipAggregator::new(
                    Arc::new(users.clone()),
                    Arc::new(relations.clone()),
                ),
                upload_dir: std::env::temp_dir().join("api-route-tests"),
            };

            Self {
                router: create_router(state),
                codec,
                users,
                relations,
            }
        }

        async fn user(&self, username: &str) -> User {
            self.users
                .create(NewUser {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    full_name: username.to_uppercase(),
                    avatar: format!("https://cdn.example.com/{}.png", username),
                    cover_image: String::new(),
                    password_hash: "plain$secret".to_string(),
                })
                .await
                .unwrap()
        }

        fn bearer(&self, user: &User) -> String {
            format!("Bearer {}", self.codec.issue_access_token(user.id).unwrap())
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, serde_json::from_slice(&bytes).unwrap())
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Request::get("/health").body(Body::empty()).unwrap())
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "api-service");
    }

    #[tokio::test]
    async fn test_current_user_requires_token() {
        let app = TestApp::new();
        let alice = app.user("alice").await;

        let (status, body) = app
            .send(Request::get("/users/me").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let request = Request::get("/users/me")
            .header(
                header::COOKIE,
                format!(
                    "accessToken={}",
                    app.codec.issue_access_token(alice.id).unwrap()
                ),
            )
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let app = TestApp::new();
        let alice = app.user("alice").await;

        let request = Request::get("/users/me")
            .header(
                header::AUTHORIZATION,
                format!(
                    "Bearer {}",
                    app.codec.issue_refresh_token(alice.id).unwrap()
                ),
            )
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_update_account() {
        let app = TestApp::new();
        let alice = app.user("alice").await;

        let request = Request::patch("/users/me")
            .header(header::AUTHORIZATION, app.bearer(&alice))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"fullName": "Alice Liddell", "email": "alice@wonderland.org"}).to_string(),
            ))
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["fullName"], "Alice Liddell");
        assert_eq!(body["data"]["email"], "alice@wonderland.org");
    }

    #[tokio::test]
    async fn test_channel_profile_for_anonymous_and_subscriber() {
        let app = TestApp::new();
        let alice = app.user("alice").await;
        let bob = app.user("bob").await;
        app.relations.subscribe(bob.id, alice.id).await;

        let (status, body) = app
            .send(Request::get("/channels/Alice").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["subscribersCount"], 1);
        assert_eq!(body["data"]["isSubscribed"], false);

        let request = Request::get("/channels/alice")
            .header(header::AUTHORIZATION, app.bearer(&bob))
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isSubscribed"], true);
    }

    #[tokio::test]
    async fn test_channel_profile_errors() {
        let app = TestApp::new();

        let (status, body) = app
            .send(Request::get("/channels/nobody").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        let request = Request::get("/channels/nobody")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_watch_history() {
        let app = TestApp::new();
        let alice = app.user("alice").await;
        let bob = app.user("bob").await;

        let request = || {
            Request::get("/users/me/history")
                .header(header::AUTHORIZATION, app.bearer(&alice))
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = app.send(request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));

        let video = app.relations.add_video(bob.id, "intro").await;
        app.relations.record_watch(alice.id, video.id).await;

        let (_, body) = app.send(request()).await;
        assert_eq!(body["data"][0]["title"], "intro");
        assert_eq!(
            body["data"][0]["owner"],
            json!({"fullName": "BOB", "username": "bob", "avatar": "https://cdn.example.com/bob.png"})
        );
    }

    #[tokio::test]
    async fn test_update_avatar_without_file() {
        let app = TestApp::new();
        let alice = app.user("alice").await;

        let request = Request::patch("/users/me/avatar")
            .header(header::AUTHORIZATION, app.bearer(&alice))
            .header(
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=X-BOUNDARY",
            )
            .body(Body::from(
                "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--X-BOUNDARY--\r\n",
            ))
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Avatar file is missing");
    }
}
