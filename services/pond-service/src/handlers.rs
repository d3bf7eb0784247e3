use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::ai::ImageAttachment;
use crate::db;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::{
    BannerResponse, ChatHistoryParams, ChatRequest, CreateHarvestRequest, CreateMortalityRequest,
    CreatePondRequest, CreateStockingRequest, HistoryParams, PredictionRequest,
};
use crate::owner::OwnerId;
use crate::service::{self, ChatInput, ServiceError};
use crate::state::AppState;

const BANNER: &str = "AquaPin System is Online";

pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse { message: BANNER })
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    let db = state.db.lock().await;
    match db::ping(&*db).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn list_ponds(State(state): State<AppState>, OwnerId(owner): OwnerId) -> impl IntoResponse {
    match service::list_ponds(&state, &owner).await {
        Ok(ponds) => (StatusCode::OK, Json(ponds)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn get_pond(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiPath(pond_id): ApiPath<i64>,
) -> impl IntoResponse {
    match service::get_pond(&state, &owner, pond_id).await {
        Ok(pond) => (StatusCode::OK, Json(pond)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_pond(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(payload): ApiJson<CreatePondRequest>,
) -> impl IntoResponse {
    match service::create_pond(&state, &owner, payload).await {
        Ok(pond) => (StatusCode::OK, Json(pond)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn active_stockings(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> impl IntoResponse {
    match service::active_stockings(&state, &owner).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_stocking(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(payload): ApiJson<CreateStockingRequest>,
) -> impl IntoResponse {
    match service::create_stocking(&state, &owner, payload).await {
        Ok(stocking) => (StatusCode::OK, Json(stocking)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_harvest(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(payload): ApiJson<CreateHarvestRequest>,
) -> impl IntoResponse {
    match service::create_harvest(&state, &owner, payload).await {
        Ok(harvest) => (StatusCode::OK, Json(harvest)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn report_mortality(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(payload): ApiJson<CreateMortalityRequest>,
) -> impl IntoResponse {
    match service::report_mortality(&state, &owner, payload).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn pond_history(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiPath(pond_id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> impl IntoResponse {
    match service::pond_history(&state, &owner, pond_id, params).await {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn analytics_summary(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> impl IntoResponse {
    Json(service::analytics_summary(&state, &owner).await)
}

pub async fn predict(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PredictionRequest>,
) -> impl IntoResponse {
    match service::predict_yield(&state, payload) {
        Ok(prediction) => (StatusCode::OK, Json(prediction)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

/// Accepts either a JSON body or a multipart form carrying `message` and an
/// optional `image` part.
pub async fn chat(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    request: Request,
) -> impl IntoResponse {
    let input = match read_chat_input(&state, request).await {
        Ok(input) => input,
        Err(err) => return (err.status, Json(err.body)).into_response(),
    };
    match service::chat(&state, &owner, input).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn chat_history(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiQuery(params): ApiQuery<ChatHistoryParams>,
) -> impl IntoResponse {
    match service::chat_history(&state, &owner, params.limit).await {
        Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

fn invalid_chat(message: impl Into<String>) -> ServiceError {
    ServiceError::bad_request("invalid_chat", message)
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn read_chat_input(state: &AppState, request: Request) -> Result<ChatInput, ServiceError> {
    if !is_multipart(&request) {
        let Json(body) = Json::<ChatRequest>::from_request(request, state)
            .await
            .map_err(|rejection| invalid_chat(rejection.body_text()))?;
        return Ok(ChatInput {
            message: body.message,
            image: None,
        });
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| invalid_chat(rejection.body_text()))?;

    let mut message = None;
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| invalid_chat(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| invalid_chat(err.body_text()))?;
                message = Some(text);
            }
            "image" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| invalid_chat(err.body_text()))?;
                // Browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    image = Some(ImageAttachment {
                        mime_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            other => {
                tracing::debug!(field = other, "ignoring chat form field");
            }
        }
    }

    Ok(ChatInput {
        message: message.unwrap_or_default(),
        image,
    })
}
