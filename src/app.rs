use std::net::SocketAddr;

use axum::{
    http::{
        header::{self, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::state::AppState;
use crate::{auth, files};

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.upload.body_limit_mb * 1024 * 1024;
    let cors = cors_layer(&state.config.cors_allow_origins);

    Router::new()
        .nest("/api/pub", auth::public_router())
        .nest(
            "/api/auth",
            Router::new()
                .merge(auth::token_router())
                .merge(files::router(body_limit)),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=315360000; includeSubDomains"),
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().path().to_owned();
                    tracing::info_span!("http_request", %method, %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// Any origin when `origins` is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_body(parts: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (filename, content) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    async fn body_string(res: axum::response::Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_carries_security_headers() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(dir.path()));

        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let h = res.headers();
        assert_eq!(h[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(h[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(h[header::CONTENT_SECURITY_POLICY], "default-src 'self'");
        assert_eq!(
            h[header::STRICT_TRANSPORT_SECURITY],
            "max-age=315360000; includeSubDomains"
        );
    }

    #[tokio::test]
    async fn token_routes_reject_anonymous_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(dir.path()));

        let res = app
            .oneshot(Request::get("/api/auth/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_string(res).await,
            r#"{"message":"authentication failed"}"#
        );
    }

    #[tokio::test]
    async fn multipart_upload_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(dir.path());
        let token = state.tokens.issue(3).unwrap().token;
        let app = build_app(state);

        let upload = |token: String| {
            Request::post("/api/auth/upload")
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(&[("a.txt", "hello"), ("a.txt", "again")])))
                .unwrap()
        };

        let res = app.clone().oneshot(upload(token.clone())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.starts_with(r#"{"message":"Loaded files: "#), "{body}");
        assert!(body.contains("a.txt") && body.contains("a(1).txt"), "{body}");

        let user_dir = dir.path().join("3");
        let mut stored: Vec<String> = std::fs::read_dir(&user_dir)
            .unwrap()
            .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
            .collect();
        stored.sort();
        assert_eq!(stored, vec!["again".to_string(), "hello".to_string()]);

        let res = app
            .oneshot(
                Request::get(format!("/api/auth/files?col=ListName&ord=asc&token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let listed: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        let names: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["list_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "a(1)"]);
    }

    #[test]
    fn cors_layer_accepts_lists_and_skips_garbage() {
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["https://files.example".into(), "bad\norigin".into()]);
    }
}
