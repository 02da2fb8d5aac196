//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use common::{
    access::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
    response::ApiResponse,
    upload::StagedFile,
};
use tracing::{debug, info};

use crate::{
    AppState,
    error::ApiError,
    middleware::{AuthUser, require_auth},
    models::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, TokenResponse},
    service::{Registration, TokenPair},
};

/// Upper bound for a registration body carrying two images
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Expired cookie with the same attributes, sent even when the request
/// carried no cookie (bearer clients)
fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

fn with_token_cookies(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
        .add(session_cookie(REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Registration endpoint, multipart with optional `avatar` and `coverImage`
/// file parts
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut registration = Registration::default();
    let mut avatar = None;
    let mut cover_image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" | "coverImage" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                let staged =
                    StagedFile::write(&state.upload_dir, file_name.as_deref(), &bytes).await?;
                if name == "avatar" {
                    avatar = Some(staged);
                } else {
                    cover_image = Some(staged);
                }
            }
            "fullName" => registration.full_name = field.text().await?,
            "email" => registration.email = field.text().await?,
            "username" => registration.username = field.text().await?,
            "password" => registration.password = field.text().await?,
            other => debug!("Ignoring registration field {}", other),
        }
    }

    info!("Registration attempt for user: {}", registration.username);
    let user = state
        .service
        .register(registration, avatar, cover_image)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(201, user, "User registered successfully")),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let outcome = state.service.login(payload.into()).await?;

    let jar = with_token_cookies(jar, &outcome.tokens);
    let body = LoginResponse {
        user: outcome.user,
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
    };

    Ok((
        jar,
        Json(ApiResponse::new(200, body, "User logged in successfully")),
    ))
}

/// Refresh token endpoint; the cookie wins over the body
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| payload.and_then(|Json(body)| body.refresh_token));

    let tokens = state.service.refresh(presented.as_deref()).await?;

    let jar = with_token_cookies(jar, &tokens);
    Ok((
        jar,
        Json(ApiResponse::new(
            200,
            TokenResponse::from(tokens),
            "Access token refreshed",
        )),
    ))
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.service.logout(user.id).await?;

    let jar = jar
        .add(removal_cookie(ACCESS_TOKEN_COOKIE))
        .add(removal_cookie(REFRESH_TOKEN_COOKIE));

    Ok((
        jar,
        Json(ApiResponse::new(
            200,
            serde_json::json!({}),
            "User logged out",
        )),
    ))
}

/// Password change endpoint
pub async fn change_password(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    state
        .service
        .change_password(user.id, &payload.old_password, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::new(
        200,
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::AuthService;
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use common::{
        access::AccessGuard,
        mock::{MemorySessionStore, MemoryUserStore, PlainHasher, StaticUploader},
        token::{TokenCodec, TokenConfig},
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-TEST-BOUNDARY";

    fn app() -> Router {
        let config = TokenConfig {
            access_secret: "access-secret".to_string(),
            refresh_secret: "refresh-secret".to_string(),
            access_token_expiry: 60,
            refresh_token_expiry: 600,
        };
        let codec = TokenCodec::new(&config);
        let users = Arc::new(MemoryUserStore::new());

        let service = AuthService::new(
            codec.clone(),
            users.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(PlainHasher),
            Arc::new(StaticUploader::new("https://cdn.example.com")),
        );

        create_router(AppState {
            service,
            guard: AccessGuard::new(codec, users),
            upload_dir: std::env::temp_dir().join("auth-route-tests"),
        })
    }

    fn registration_body(username: &str) -> String {
        let mut body = String::new();
        for (name, value) in [
            ("fullName", "Alice Liddell"),
            ("email", "alice@example.com"),
            ("username", username),
            ("password", "wonderland"),
        ] {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n--{BOUNDARY}--\r\n"
        ));
        body
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<String>, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, cookies, json)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn register_and_login(app: &Router) -> serde_json::Value {
        let request = Request::post("/auth/register")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(registration_body("Alice")))
            .unwrap();
        let (status, _, _) = send(app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _, body) = send(
            app,
            json_post(
                "/auth/login",
                serde_json::json!({"username": "alice", "password": "wonderland"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(
            &app(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_returns_sanitized_user() {
        let app = app();
        let request = Request::post("/auth/register")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(registration_body("Alice")))
            .unwrap();

        let (status, _, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["statusCode"], 201);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"].get("passwordHash").is_none());
        assert!(body["data"]["avatar"].as_str().unwrap().ends_with(".png"));
    }

    #[tokio::test]
    async fn test_login_sets_http_only_cookies() {
        let app = app();
        let request = Request::post("/auth/register")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(registration_body("alice")))
            .unwrap();
        send(&app, request).await;

        let (status, cookies, body) = send(
            &app,
            json_post(
                "/auth/login",
                serde_json::json!({"email": "alice@example.com", "password": "wonderland"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User logged in successfully");
        assert!(body["data"]["accessToken"].is_string());
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("HttpOnly") && c.contains("Secure")));
        assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    }

    #[tokio::test]
    async fn test_refresh_rotates_once() {
        let app = app();
        let login = register_and_login(&app).await;
        let refresh = login["data"]["refreshToken"].as_str().unwrap().to_string();

        let (status, _, rotated) = send(
            &app,
            json_post("/auth/refresh", serde_json::json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["data"]["refreshToken"], login["data"]["refreshToken"]);

        let replay = Request::post("/auth/refresh")
            .header(header::COOKIE, format!("refreshToken={refresh}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, replay).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_body_when_cookie_is_empty() {
        let app = app();
        let login = register_and_login(&app).await;
        let refresh = login["data"]["refreshToken"].as_str().unwrap();

        let request = Request::post("/auth/refresh")
            .header(header::COOKIE, "refreshToken=")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({"refreshToken": refresh}).to_string(),
            ))
            .unwrap();
        let (status, cookies, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Access token refreshed");
        assert_ne!(body["data"]["refreshToken"], login["data"]["refreshToken"]);
        assert_eq!(cookies.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let (status, _, body) = send(
            &app(),
            Request::post("/auth/refresh").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Unauthorized request");
    }

    #[tokio::test]
    async fn test_logout_requires_access_token_and_clears_session() {
        let app = app();
        let login = register_and_login(&app).await;
        let access = login["data"]["accessToken"].as_str().unwrap();
        let refresh = login["data"]["refreshToken"].as_str().unwrap();

        let (status, _, _) = send(
            &app,
            Request::post("/auth/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::post("/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let (status, cookies, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cookies.len(), 2);

        let (status, _, _) = send(
            &app,
            json_post("/auth/refresh", serde_json::json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_with_malformed_body() {
        let request = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, _, body) = send(&app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
    }
}
