use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, SignUpRequest, TokenResponse},
        jwt::{BearerToken, TokenError},
        services::{authenticate, register, AuthError, RegisterError},
    },
    error::{ApiError, MessageBody},
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/refresh_token", get(refresh_token))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<MessageBody>, ApiError> {
    let username = payload.username.trim();

    let user = register(state.users.as_ref(), username, &payload.password)
        .await
        .map_err(|e| match e {
            RegisterError::InvalidUsername => {
                warn!(%username, "invalid username");
                ApiError::Validation("Invalid username".into())
            }
            RegisterError::Policy(p) => {
                warn!(%username, reason = %p, "weak password");
                ApiError::Validation(p.to_string())
            }
            RegisterError::Taken => {
                warn!(%username, "username already registered");
                ApiError::Conflict("User already exists".into())
            }
            RegisterError::Hash(e) => {
                error!(error = %e, "hash_password failed");
                ApiError::internal(e)
            }
            RegisterError::Store(e) => {
                error!(error = %e, "create user failed");
                ApiError::internal(e)
            }
        })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(Json(MessageBody {
        message: "Success registration.".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = authenticate(state.users.as_ref(), &payload.username, &payload.password)
        .await
        .map_err(|e| match e {
            AuthError::Failed => ApiError::Unauthorized,
            AuthError::Store(e) => ApiError::internal(e),
        })?;

    let issued = state.tokens.issue(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::internal(e)
    })?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(issued.into()))
}

#[instrument(skip(state, token))]
pub async fn refresh_token(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state.tokens.refresh(&token).map_err(|e| match e {
        TokenError::Sign(e) => {
            error!(error = %e, "jwt sign failed");
            ApiError::internal(e)
        }
        other => {
            warn!(error = %other, "refresh refused");
            ApiError::Unauthorized
        }
    })?;
    Ok(Json(issued.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    const GOOD: &str = "abcdEFGH1234!@#$";

    fn signup_body(username: &str, password: &str) -> Json<SignUpRequest> {
        Json(SignUpRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    fn login_body(username: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    fn status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[tokio::test]
    async fn signup_login_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(dir.path());

        let Json(msg) = signup(State(state.clone()), signup_body(" alice ", GOOD))
            .await
            .unwrap();
        assert_eq!(msg.message, "Success registration.");

        let Json(login_res) = login(State(state.clone()), login_body("alice", GOOD))
            .await
            .unwrap();
        assert_eq!(login_res.code, 200);
        let claims = state.tokens.verify(&login_res.token).unwrap();

        let Json(refreshed) = refresh_token(State(state.clone()), BearerToken(login_res.token))
            .await
            .unwrap();
        let renewed = state.tokens.verify(&refreshed.token).unwrap();
        assert_eq!(renewed.id, claims.id);
        assert_eq!(renewed.orig_iat, claims.orig_iat);
    }

    #[tokio::test]
    async fn signup_errors_map_to_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(dir.path());
        signup(State(state.clone()), signup_body("bob", GOOD))
            .await
            .unwrap();

        let taken = signup(State(state.clone()), signup_body("bob", GOOD))
            .await
            .unwrap_err();
        assert_eq!(status(taken), StatusCode::CONFLICT);

        let weak = signup(State(state.clone()), signup_body("carol", "password"))
            .await
            .unwrap_err();
        assert_eq!(status(weak), StatusCode::BAD_REQUEST);

        let blank = signup(State(state), signup_body("   ", GOOD))
            .await
            .unwrap_err();
        assert_eq!(status(blank), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_credentials_are_generic_401() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(dir.path());
        signup(State(state.clone()), signup_body("dave", GOOD))
            .await
            .unwrap();

        for (user, pass) in [("dave", "wrongPassword#123"), ("nobody", GOOD)] {
            let err = login(State(state.clone()), login_body(user, pass))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized));
            assert_eq!(status(err), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn refresh_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(dir.path());
        let err = refresh_token(State(state), BearerToken("not.a.jwt".into()))
            .await
            .unwrap_err();
        assert_eq!(status(err), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn token_response_serializes_rfc3339_expiry() {
        let res = TokenResponse {
            code: 200,
            token: "t".into(),
            expire: time::macros::datetime!(2024-05-01 13:00 UTC),
        };
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"expire\":\"2024-05-01T13:00:00Z\""));
    }
}
