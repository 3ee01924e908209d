//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the storage backend

use crate::services::FileService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// Reported for a failed check. Backend detail goes to the log only.
const UNAVAILABLE: &str = "unavailable";

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against the store and probes both tables through their
/// indexes. HTTP 200 when every check passes, HTTP 503 otherwise.
pub async fn readyz(State(service): State<FileService>) -> impl IntoResponse {
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => (true, None::<String>),
        Ok(v) => {
            tracing::error!("readiness query returned unexpected result: {}", v);
            (false, Some(UNAVAILABLE.to_string()))
        }
        Err(e) => {
            tracing::error!("readiness query failed: {}", e);
            (false, Some(UNAVAILABLE.to_string()))
        }
    };

    let schema_check = match sqlx::query_scalar::<_, i64>(
        "SELECT (SELECT COUNT(*) FROM objects WHERE 0) + (SELECT COUNT(*) FROM chunks WHERE 0)",
    )
    .fetch_one(&*service.db)
    .await
    {
        Ok(_) => (true, None::<String>),
        Err(e) => {
            tracing::error!("schema probe failed: {}", e);
            (false, Some(UNAVAILABLE.to_string()))
        }
    };

    let overall_ok = sqlite_check.0 && schema_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_check.0,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "schema",
        CheckStatus {
            ok: schema_check.0,
            error: schema_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use crate::{routes::routes::routes, services::test_support::service};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn probes_report_ok_on_a_migrated_store() {
        let (_dir, svc) = service(4).await;
        let app = routes().with_state(svc);

        for uri in ["/healthz", "/readyz"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn readiness_fails_without_schema() {
        let (_dir, svc) = service(4).await;
        sqlx::query("DROP TABLE chunks").execute(&*svc.db).await.unwrap();

        let response = routes()
            .with_state(svc)
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("no such table"), "{text}");

        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["checks"]["schema"]["ok"], false);
        assert_eq!(body["checks"]["schema"]["error"], "unavailable");
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
    }
}
