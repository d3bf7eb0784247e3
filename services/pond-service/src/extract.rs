use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::service::ServiceError;

// Thin wrappers over axum's extractors so malformed input still answers with
// the usual error body instead of axum's plain-text rejection.

fn invalid_request(status: StatusCode, message: String) -> ServiceError {
    ServiceError::new(status, "invalid_request", message)
}

pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_request(rejection.status(), rejection.body_text())),
        }
    }
}

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_request(rejection.status(), rejection.body_text())),
        }
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_request(rejection.status(), rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest},
    };

    use crate::models::{HistoryParams, PredictionRequest};

    fn json_request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = HttpRequest::builder().method("POST").uri("/api/predict");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).expect("request")
    }

    #[tokio::test]
    async fn truncated_json_is_a_bad_request() {
        let request = json_request(Some("application/json"), r#"{"fry_quantity": "#);
        let Err(err) = ApiJson::<PredictionRequest>::from_request(request, &()).await else {
            panic!("expected rejection");
        };
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "invalid_request");
        assert!(!err.body.message.is_empty());
    }

    #[tokio::test]
    async fn wrong_field_types_keep_the_error_shape() {
        let request = json_request(
            Some("application/json"),
            r#"{"fry_quantity": "many", "days_cultured": 90, "area_sqm": 100.0}"#,
        );
        let Err(err) = ApiJson::<PredictionRequest>::from_request(request, &()).await else {
            panic!("expected rejection");
        };
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.code, "invalid_request");
    }

    #[tokio::test]
    async fn missing_content_type_is_reported() {
        let request = json_request(None, r#"{"fry_quantity": 1, "days_cultured": 1, "area_sqm": 1.0}"#);
        let Err(err) = ApiJson::<PredictionRequest>::from_request(request, &()).await else {
            panic!("expected rejection");
        };
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.body.code, "invalid_request");
    }

    #[tokio::test]
    async fn valid_json_passes_through() {
        let request = json_request(
            Some("application/json"),
            r#"{"fry_quantity": 500, "days_cultured": 90, "area_sqm": 100.0}"#,
        );
        let Ok(ApiJson(payload)) = ApiJson::<PredictionRequest>::from_request(request, &()).await
        else {
            panic!("expected payload");
        };
        assert_eq!(payload.fry_quantity, 500);
    }

    #[tokio::test]
    async fn bad_query_string_keeps_the_error_shape() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/api/history/1?page=first")
            .body(())
            .expect("request")
            .into_parts();
        let Err(err) = ApiQuery::<HistoryParams>::from_request_parts(&mut parts, &()).await else {
            panic!("expected rejection");
        };
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "invalid_request");
    }
}
