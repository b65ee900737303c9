//! Defines routes for the file and health endpoints.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /cicd`: metadata store write probe
//!
//! - **Files**
//!   - `POST   /v1/file`: upload (multipart, single `profilePic` part)
//!   - `GET    /v1/file/list`: list object store keys
//!   - `GET    /v1/file/{id}`: fetch file record
//!   - `DELETE /v1/file/{id}`: delete file
//!
//! Any other method on these paths answers 405, except `GET`/`DELETE`
//! on `/v1/file` without an id, which answer 400.

use crate::{
    handlers::{
        file_handlers::{
            delete_file, get_file, list_files, method_not_allowed, missing_file_id, upload_file,
        },
        health_handlers::{health_method_not_allowed, healthz},
    },
    services::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{MethodRouter, get},
};

fn health_route() -> MethodRouter<AppState> {
    get(healthz)
        .head(health_method_not_allowed)
        .fallback(health_method_not_allowed)
}

/// Build and return the router for all endpoints.
///
/// The router carries shared state (`AppState`) to all handlers. Request
/// bodies above `max_upload_bytes` are refused.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", health_route())
        .route("/cicd", health_route())
        .route(
            "/v1/file",
            get(missing_file_id)
                .post(upload_file)
                .delete(missing_file_id)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/file/list",
            get(list_files)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/file/{id}",
            get(get_file)
                .delete(delete_file)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handlers::file_handlers::UPLOAD_FIELD,
        services::{file_registry::FileRegistry, health_service::HealthService},
        testutil::{MemoryMetadataStore, MemoryObjectStore, MetadataOp, ObjectOp, TEST_BUCKET},
    };
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-FILE-REGISTRY-BOUNDARY";

    struct Harness {
        app: Router,
        objects: Arc<MemoryObjectStore>,
        metadata: Arc<MemoryMetadataStore>,
    }

    fn harness() -> Harness {
        let objects = Arc::new(MemoryObjectStore::default());
        let metadata = Arc::new(MemoryMetadataStore::default());
        let state = AppState {
            files: FileRegistry::new(objects.clone(), metadata.clone()),
            health: HealthService::new(metadata.clone()),
        };
        Harness {
            app: routes(1024).with_state(state),
            objects,
            metadata,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn empty(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Multipart body with one part per `(field, file name, contents)`.
    fn multipart(uri: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (field, file_name, contents) in parts {
            body.push_str(&format!(
                concat!(
                    "--{}\r\n",
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    "Content-Type: application/octet-stream\r\n\r\n{}\r\n"
                ),
                BOUNDARY, field, file_name, contents
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn upload(app: &Router, name: &str) -> Value {
        let response = send(app, multipart("/v1/file", &[(UPLOAD_FIELD, name, "hello")])).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json(response).await
    }

    #[tokio::test]
    async fn healthz_ok_sets_no_cache() {
        let h = harness();
        let response = send(&h.app, empty(Method::GET, "/healthz")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(h.metadata.probe_count(), 1);
    }

    #[tokio::test]
    async fn healthz_unavailable_when_probe_fails() {
        let h = harness();
        h.metadata.fail_on(MetadataOp::Probe);

        let response = send(&h.app, empty(Method::GET, "/cicd")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthz_rejects_query_and_body() {
        let h = harness();

        let response = send(&h.app, empty(Method::GET, "/healthz?invalidParam=value")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri("/healthz")
            .body(Body::from("test-body"))
            .unwrap();
        assert_eq!(send(&h.app, request).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.metadata.probe_count(), 0);
    }

    #[tokio::test]
    async fn healthz_other_methods_are_not_allowed() {
        let h = harness();
        for method in [
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::HEAD,
            Method::OPTIONS,
            Method::TRACE,
        ] {
            let response = send(&h.app, empty(method.clone(), "/healthz")).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        }

        let response = send(&h.app, empty(Method::POST, "/healthz?x=1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_returns_created_record() {
        let h = harness();
        let body = upload(&h.app, "report.pdf").await;

        let id = body["id"].as_str().unwrap();
        assert_eq!(body["file_name"], "report.pdf");
        assert_eq!(body["url"], format!("{}/{}/report.pdf", TEST_BUCKET, id));
        assert!(body["upload_date"].is_string());
        assert!(body.get("object_key").is_none());
        assert!(h.objects.contains(&format!("{}/report.pdf", id)));
    }

    #[tokio::test]
    async fn upload_requires_exactly_one_named_part() {
        let h = harness();

        let none = send(&h.app, multipart("/v1/file", &[])).await;
        assert_eq!(none.status(), StatusCode::BAD_REQUEST);

        let two = multipart(
            "/v1/file",
            &[(UPLOAD_FIELD, "a.txt", "a"), (UPLOAD_FIELD, "b.txt", "b")],
        );
        assert_eq!(send(&h.app, two).await.status(), StatusCode::BAD_REQUEST);

        let wrong = multipart("/v1/file", &[("document", "a.txt", "a")]);
        assert_eq!(send(&h.app, wrong).await.status(), StatusCode::BAD_REQUEST);

        let query = multipart("/v1/file?x=1", &[(UPLOAD_FIELD, "a.txt", "a")]);
        assert_eq!(send(&h.app, query).await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(h.metadata.record_count(), 0);
    }

    #[tokio::test]
    async fn upload_failure_is_bad_request() {
        let h = harness();
        h.objects.fail_on(ObjectOp::Put);

        let response = send(&h.app, multipart("/v1/file", &[(UPLOAD_FIELD, "a", "a")])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.metadata.record_count(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_refused() {
        let h = harness();
        let big = "x".repeat(4096);

        let response = send(&h.app, multipart("/v1/file", &[(UPLOAD_FIELD, "a", &big)])).await;
        assert!(response.status().is_client_error());
        assert_eq!(h.metadata.record_count(), 0);
    }

    #[tokio::test]
    async fn file_lifecycle_over_http() {
        let h = harness();
        let created = upload(&h.app, "report.pdf").await;
        let id = created["id"].as_str().unwrap().to_string();

        let fetched = send(&h.app, empty(Method::GET, &format!("/v1/file/{}", id))).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(json(fetched).await, created);

        let listed = send(&h.app, empty(Method::GET, "/v1/file/list")).await;
        assert_eq!(listed.status(), StatusCode::OK);
        assert_eq!(
            json(listed).await,
            serde_json::json!([format!("{}/report.pdf", id)])
        );

        let deleted = send(&h.app, empty(Method::DELETE, &format!("/v1/file/{}", id))).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let fetched = send(&h.app, empty(Method::GET, &format!("/v1/file/{}", id))).await;
        assert_eq!(fetched.status(), StatusCode::NOT_FOUND);

        let deleted = send(&h.app, empty(Method::DELETE, &format!("/v1/file/{}", id))).await;
        assert_eq!(deleted.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upstream_failures_are_server_errors() {
        let h = harness();
        let created = upload(&h.app, "a.txt").await;
        let id = created["id"].as_str().unwrap();
        h.objects.fail_on(ObjectOp::Head);
        h.objects.fail_on(ObjectOp::Delete);
        h.objects.fail_on(ObjectOp::List);

        for (method, uri) in [
            (Method::GET, format!("/v1/file/{}", id)),
            (Method::DELETE, format!("/v1/file/{}", id)),
            (Method::GET, "/v1/file/list".to_string()),
        ] {
            let response = send(&h.app, empty(method, &uri)).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
        }
        assert!(h.metadata.record(id).is_some());
    }

    #[tokio::test]
    async fn file_routes_reject_query_parameters() {
        let h = harness();
        for (method, uri) in [
            (Method::GET, "/v1/file/list?x=1"),
            (Method::GET, "/v1/file/abc?x=1"),
            (Method::DELETE, "/v1/file/abc?x=1"),
            (Method::PUT, "/v1/file/abc?x=1"),
        ] {
            let response = send(&h.app, empty(method, uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn file_routes_without_id_or_with_wrong_method() {
        let h = harness();

        for method in [Method::GET, Method::DELETE] {
            let response = send(&h.app, empty(method, "/v1/file")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        for method in [Method::HEAD, Method::PUT, Method::PATCH, Method::OPTIONS] {
            let response = send(&h.app, empty(method.clone(), "/v1/file")).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);

            let response = send(&h.app, empty(method.clone(), "/v1/file/abc")).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        }
        let response = send(&h.app, empty(Method::POST, "/v1/file/abc")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn rejections_have_empty_bodies() {
        let h = harness();

        for (method, uri, status) in [
            (Method::PUT, "/v1/file/abc", StatusCode::METHOD_NOT_ALLOWED),
            (Method::POST, "/healthz", StatusCode::METHOD_NOT_ALLOWED),
            (Method::GET, "/v1/file", StatusCode::BAD_REQUEST),
            (Method::GET, "/v1/file/list?x=1", StatusCode::BAD_REQUEST),
        ] {
            let response = send(&h.app, empty(method, uri)).await;
            assert_eq!(response.status(), status, "{}", uri);
            assert!(body_bytes(response).await.is_empty(), "{}", uri);
        }

        let missing = send(&h.app, empty(Method::GET, "/v1/file/nope")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(missing).await["status"], 404);
    }
}
