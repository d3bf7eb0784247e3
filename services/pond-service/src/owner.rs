use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::service::ServiceError;

pub const OWNER_HEADER: &str = "x-user-id";
const MAX_OWNER_LEN: usize = 128;

/// Tenant identifier taken from the `x-user-id` header. Every owner-scoped
/// query filters on it.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok());
        parse_owner(raw)
            .map(OwnerId)
            .map_err(|err| (err.status, Json(err.body)).into_response())
    }
}

pub fn parse_owner(raw: Option<&str>) -> Result<String, ServiceError> {
    let owner = raw.map(str::trim).unwrap_or_default();
    if owner.is_empty() {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "missing_owner",
            format!("{OWNER_HEADER} header missing"),
        ));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "missing_owner",
            format!("{OWNER_HEADER} header longer than {MAX_OWNER_LEN} bytes"),
        ));
    }
    Ok(owner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_or_blank_owner() {
        for raw in [None, Some(""), Some("   ")] {
            let err = parse_owner(raw).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.body.code, "missing_owner");
        }
    }

    #[test]
    fn trims_owner() {
        assert_eq!(parse_owner(Some(" 42 ")).expect("valid"), "42");
    }

    #[test]
    fn rejects_oversized_owner() {
        let long = "x".repeat(MAX_OWNER_LEN + 1);
        assert!(parse_owner(Some(&long)).is_err());
    }
}
