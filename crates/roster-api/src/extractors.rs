//! Request extractors that reject with [`AppError`]
//!
//! Wrapping axum's `Json`, `Form`, `Path` and `Query` keeps malformed
//! input on the same `{code, message}` body as every other error.

use crate::error::AppError;
use axum::extract::{Form, FromRequest, FromRequestParts, Json, Path, Query};

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// URL-encoded form body
#[derive(Debug, FromRequest)]
#[from_request(via(Form), rejection(AppError))]
pub struct ApiForm<T>(pub T);

/// Typed path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Typed query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::IntoResponse,
    };
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct RefreshBody {
        #[allow(dead_code)]
        refresh_token: String,
    }

    async fn reject(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let err = ApiJson::<RefreshBody>::from_request(request, &()).await.unwrap_err();
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_syntax_error_is_bad_request_body() {
        let (status, body) = reject(json_request("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let (status, body) = reject(json_request("{}")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let request = Request::builder()
            .method("POST")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = reject(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["code"], "UNSUPPORTED_MEDIA_TYPE");
    }
}
