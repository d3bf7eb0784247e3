use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tokio_postgres::error::SqlState;

use crate::ai::ImageAttachment;
use crate::analytics::{self, AnalyticsSummary};
use crate::cycles::{self, HistoryItem};
use crate::db::{self, NewHarvest, NewMortality, NewPond};
use crate::geometry::{round2, Boundary};
use crate::models::{
    ActiveStockingItem, ChatMessage, ChatResponse, CreateHarvestRequest, CreateMortalityRequest,
    CreatePondRequest, CreateStockingRequest, ErrorResponse, HarvestResponse, HistoryParams,
    MortalityResponse, Pond, PondResponse, PredictionRequest, PredictionResponse, StockingLog,
    StockingResponse,
};
use crate::predict::YieldFeatures;
use crate::state::AppState;
use crate::stock::{summarize_active, ActiveStock};

const DEFAULT_LOCATION: &str = "Unknown Location";
const DEFAULT_FISH_SIZE: &str = "Standard";
const DEFAULT_SURVIVAL_RATE: f64 = 0.85;
const MAX_CHAT_HISTORY: i64 = 200;

#[derive(Debug)]
pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message,
                reasons: Vec::new(),
            },
        }
    }

    pub fn with_reasons(
        status: StatusCode,
        code: &'static str,
        message: String,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message,
                reasons,
            },
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message.into())
    }

    pub fn not_found(code: &'static str, message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message.to_string())
    }

    /// Logs the underlying cause; callers only see a generic message.
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "db_error",
            "database error".to_string(),
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Chat input after the body has been read, whatever its encoding.
pub struct ChatInput {
    pub message: String,
    pub image: Option<ImageAttachment>,
}

fn pond_response(pond: Pond, stock: ActiveStock) -> PondResponse {
    PondResponse {
        id: pond.id,
        owner_id: pond.owner_id,
        name: pond.name,
        location_desc: pond.location_desc,
        coordinates: pond.coordinates,
        area_sqm: pond.area_sqm,
        image_base64: pond.image_base64,
        created_at: pond.created_at,
        total_fish: stock.total_fish,
        active_species: stock.species,
        last_stocked_at: stock.last_stocked_at,
    }
}

fn group_by_pond(stockings: Vec<StockingLog>) -> HashMap<i64, Vec<StockingLog>> {
    let mut grouped: HashMap<i64, Vec<StockingLog>> = HashMap::new();
    for stocking in stockings {
        grouped.entry(stocking.pond_id).or_default().push(stocking);
    }
    grouped
}

pub async fn list_ponds(state: &AppState, owner_id: &str) -> Result<Vec<PondResponse>, ServiceError> {
    let db = state.db.lock().await;
    let ponds = db::list_ponds(&*db, owner_id)
        .await
        .map_err(|err| ServiceError::database("list ponds failed", err))?;

    // Aggregates degrade to empty stock rather than failing the listing.
    let (stockings, harvested) = match load_owner_stock(&*db, owner_id).await {
        Ok(loaded) => loaded,
        Err(err) => {
            tracing::warn!(owner_id, error = %err, "pond aggregates unavailable");
            (Vec::new(), HashSet::new())
        }
    };
    drop(db);

    let mut by_pond = group_by_pond(stockings);
    Ok(ponds
        .into_iter()
        .map(|pond| {
            let stock = summarize_active(
                by_pond.remove(&pond.id).as_deref().unwrap_or_default(),
                &harvested,
            );
            pond_response(pond, stock)
        })
        .collect())
}

async fn load_owner_stock(
    db: &impl tokio_postgres::GenericClient,
    owner_id: &str,
) -> Result<(Vec<StockingLog>, HashSet<i64>), String> {
    let stockings = db::list_owner_stockings(db, owner_id).await?;
    let harvests = db::list_owner_harvests(db, owner_id).await?;
    Ok((stockings, db::harvested_ids(&harvests)))
}

pub async fn get_pond(
    state: &AppState,
    owner_id: &str,
    pond_id: i64,
) -> Result<PondResponse, ServiceError> {
    let db = state.db.lock().await;
    let pond = db::select_pond(&*db, pond_id, owner_id)
        .await
        .map_err(|err| ServiceError::database("select pond failed", err))?
        .ok_or_else(|| ServiceError::not_found("pond_not_found", "pond not found"))?;

    let stock = match pond_stock(&*db, pond_id).await {
        Ok(stock) => stock,
        Err(err) => {
            tracing::warn!(owner_id, pond_id, error = %err, "pond aggregates unavailable");
            ActiveStock::default()
        }
    };

    Ok(pond_response(pond, stock))
}

async fn pond_stock(
    db: &impl tokio_postgres::GenericClient,
    pond_id: i64,
) -> Result<ActiveStock, String> {
    let stockings = db::list_pond_stockings(db, pond_id).await?;
    let harvests = db::list_pond_harvests(db, pond_id).await?;
    Ok(summarize_active(&stockings, &db::harvested_ids(&harvests)))
}

pub async fn create_pond(
    state: &AppState,
    owner_id: &str,
    payload: CreatePondRequest,
) -> Result<PondResponse, ServiceError> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ServiceError::bad_request("invalid_pond", "pond name is required"));
    }

    let boundary = Boundary::new(payload.coordinates)
        .map_err(|err| ServiceError::bad_request("invalid_boundary", err.to_string()))?;
    let area_sqm = round2(boundary.area_sqm());
    let coordinates = serde_json::to_value(boundary.to_pairs())
        .map_err(|err| ServiceError::database("encode boundary failed", err))?;

    let location_desc = payload
        .location_desc
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOCATION);
    let image_base64 = payload
        .image_base64
        .as_deref()
        .filter(|value| !value.trim().is_empty());

    let new_pond = NewPond {
        owner_id,
        name,
        location_desc: Some(location_desc),
        coordinates,
        area_sqm,
        image_base64,
    };

    let db = state.db.lock().await;
    let pond = db::insert_pond(&*db, &new_pond)
        .await
        .map_err(|err| ServiceError::database("insert pond failed", err))?;

    tracing::info!(
        owner_id,
        pond_id = pond.id,
        area_sqm = pond.area_sqm,
        points = boundary.points().len(),
        "pond created"
    );
    Ok(pond_response(pond, ActiveStock::default()))
}

pub async fn active_stockings(
    state: &AppState,
    owner_id: &str,
) -> Result<Vec<ActiveStockingItem>, ServiceError> {
    let db = state.db.lock().await;
    let ponds = db::list_ponds(&*db, owner_id)
        .await
        .map_err(|err| ServiceError::database("list ponds failed", err))?;
    let (stockings, harvested) = load_owner_stock(&*db, owner_id)
        .await
        .map_err(|err| ServiceError::database("load stock failed", err))?;
    drop(db);

    let pond_names: HashMap<i64, String> =
        ponds.into_iter().map(|pond| (pond.id, pond.name)).collect();

    Ok(stockings
        .into_iter()
        .filter(|stocking| !harvested.contains(&stocking.id))
        .map(|stocking| {
            let pond_name = pond_names
                .get(&stocking.pond_id)
                .cloned()
                .unwrap_or_else(|| format!("Pond {}", stocking.pond_id));
            ActiveStockingItem {
                id: stocking.id,
                pond_id: stocking.pond_id,
                label: format!(
                    "{} - {} ({}pcs)",
                    pond_name, stocking.fry_type, stocking.fry_quantity
                ),
                date: stocking.stocking_date,
            }
        })
        .collect())
}

fn validate_stocking(payload: &CreateStockingRequest) -> Result<f64, ServiceError> {
    let mut reasons = Vec::new();
    if payload.fry_type.trim().is_empty() {
        reasons.push("fry_type is required".to_string());
    }
    if payload.fry_quantity <= 0 {
        reasons.push("fry_quantity must be positive".to_string());
    }
    let survival = payload
        .estimated_survival_rate
        .unwrap_or(DEFAULT_SURVIVAL_RATE);
    if !(survival > 0.0 && survival <= 1.0) {
        reasons.push("estimated_survival_rate must be in (0, 1]".to_string());
    }

    if reasons.is_empty() {
        Ok(survival)
    } else {
        Err(ServiceError::with_reasons(
            StatusCode::BAD_REQUEST,
            "invalid_stocking",
            "stocking request rejected".to_string(),
            reasons,
        ))
    }
}

pub async fn create_stocking(
    state: &AppState,
    owner_id: &str,
    payload: CreateStockingRequest,
) -> Result<StockingResponse, ServiceError> {
    let survival = validate_stocking(&payload)?;

    let db = state.db.lock().await;
    db::select_pond(&*db, payload.pond_id, owner_id)
        .await
        .map_err(|err| ServiceError::database("select pond failed", err))?
        .ok_or_else(|| ServiceError::not_found("pond_not_found", "pond not found"))?;

    let stocking = match db::insert_stocking(&*db, payload.pond_id, &payload, survival).await {
        Ok(stocking) => stocking,
        Err(err) => {
            if let Some(db_err) = err.as_db_error() {
                // The pond can vanish between the ownership check and the insert.
                if db_err.code() == &SqlState::FOREIGN_KEY_VIOLATION {
                    return Err(ServiceError::not_found("pond_not_found", "pond not found"));
                }
            }
            return Err(ServiceError::database("insert stocking failed", err));
        }
    };

    tracing::info!(
        owner_id,
        pond_id = stocking.pond_id,
        stocking_id = stocking.id,
        fry_quantity = stocking.fry_quantity,
        "stocking recorded"
    );
    Ok(stocking.into())
}

pub async fn create_harvest(
    state: &AppState,
    owner_id: &str,
    payload: CreateHarvestRequest,
) -> Result<HarvestResponse, ServiceError> {
    let mut db = state.db.lock().await;
    let transaction = db
        .transaction()
        .await
        .map_err(|err| ServiceError::database("start transaction failed", err))?;
    let owned = db::select_owned_stocking(&transaction, payload.stocking_id, owner_id)
        .await
        .map_err(|err| ServiceError::database("select stocking failed", err))?
        .ok_or_else(|| ServiceError::not_found("stocking_not_found", "stocking not found"))?;

    let figures = cycles::derive_harvest(
        owned.stocking.stocking_date,
        payload.harvest_date,
        payload.total_weight_kg,
        payload.market_price_per_kg,
    )
    .map_err(|err| ServiceError::bad_request("invalid_harvest", err.to_string()))?;

    let fish_size = payload
        .fish_size
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_FISH_SIZE);

    let new_harvest = NewHarvest {
        stocking_id: payload.stocking_id,
        harvest_date: payload.harvest_date,
        total_weight_kg: payload.total_weight_kg,
        market_price_per_kg: payload.market_price_per_kg,
        revenue: figures.revenue,
        days_cultured: figures.days_cultured,
        fish_size: Some(fish_size),
    };

    let harvest = match db::insert_harvest(&transaction, &new_harvest).await {
        Ok(harvest) => harvest,
        Err(err) => {
            if let Some(db_err) = err.as_db_error() {
                if db_err.code() == &SqlState::UNIQUE_VIOLATION {
                    return Err(ServiceError::new(
                        StatusCode::CONFLICT,
                        "already_harvested",
                        format!("stocking {} already has a harvest", payload.stocking_id),
                    ));
                }
                if db_err.code() == &SqlState::FOREIGN_KEY_VIOLATION {
                    return Err(ServiceError::not_found(
                        "stocking_not_found",
                        "stocking not found",
                    ));
                }
            }
            return Err(ServiceError::database("insert harvest failed", err));
        }
    };
    transaction
        .commit()
        .await
        .map_err(|err| ServiceError::database("commit failed", err))?;

    tracing::info!(
        owner_id,
        pond = owned.pond_name.as_str(),
        stocking_id = harvest.stocking_id,
        days_cultured = harvest.days_cultured,
        revenue = harvest.revenue,
        "harvest recorded, cycle closed"
    );

    Ok(HarvestResponse {
        id: harvest.id,
        stocking_id: harvest.stocking_id,
        harvest_date: harvest.harvest_date,
        days_cultured: harvest.days_cultured,
        revenue: harvest.revenue,
        fish_size: harvest.fish_size,
    })
}

fn validate_mortality(payload: &CreateMortalityRequest) -> Result<(), ServiceError> {
    let mut reasons = Vec::new();
    if payload.quantity_lost < 0 {
        reasons.push("quantity_lost must not be negative".to_string());
    }
    if !payload.weight_lost_kg.is_finite() || payload.weight_lost_kg < 0.0 {
        reasons.push("weight_lost_kg must be a non-negative number".to_string());
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::with_reasons(
            StatusCode::BAD_REQUEST,
            "invalid_mortality",
            "mortality report rejected".to_string(),
            reasons,
        ))
    }
}

pub async fn report_mortality(
    state: &AppState,
    owner_id: &str,
    payload: CreateMortalityRequest,
) -> Result<MortalityResponse, ServiceError> {
    validate_mortality(&payload)?;
    let cause = payload.cause();

    let db = state.db.lock().await;
    db::select_owned_stocking(&*db, payload.stocking_id, owner_id)
        .await
        .map_err(|err| ServiceError::database("select stocking failed", err))?
        .ok_or_else(|| ServiceError::not_found("stocking_not_found", "stocking not found"))?;

    let action_taken = payload
        .action_taken
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let loss = NewMortality {
        stocking_id: payload.stocking_id,
        loss_date: payload.loss_date,
        quantity_lost: payload.quantity_lost,
        weight_lost_kg: payload.weight_lost_kg,
        cause: cause.as_str(),
        action_taken,
    };
    let id = db::insert_mortality(&*db, &loss)
        .await
        .map_err(|err| ServiceError::database("insert mortality failed", err))?;

    tracing::info!(
        owner_id,
        stocking_id = payload.stocking_id,
        cause = cause.as_str(),
        quantity_lost = payload.quantity_lost,
        "mortality reported"
    );

    Ok(MortalityResponse {
        id,
        cause: cause.to_string(),
        solution: cause.solution(),
    })
}

pub async fn pond_history(
    state: &AppState,
    owner_id: &str,
    pond_id: i64,
    params: HistoryParams,
) -> Result<Vec<HistoryItem>, ServiceError> {
    let db = state.db.lock().await;
    db::select_pond(&*db, pond_id, owner_id)
        .await
        .map_err(|err| ServiceError::database("select pond failed", err))?
        .ok_or_else(|| ServiceError::not_found("pond_not_found", "pond not found"))?;

    let stockings = db::list_pond_stockings(&*db, pond_id)
        .await
        .map_err(|err| ServiceError::database("list stockings failed", err))?;
    let harvests = db::list_pond_harvests(&*db, pond_id)
        .await
        .map_err(|err| ServiceError::database("list harvests failed", err))?;
    drop(db);

    let history = cycles::match_cycles(&stockings, &harvests);
    Ok(cycles::paginate(history, params.page, params.limit))
}

pub async fn analytics_summary(state: &AppState, owner_id: &str) -> AnalyticsSummary {
    let db = state.db.lock().await;
    let loaded = async {
        let stockings = db::list_owner_stockings(&*db, owner_id).await?;
        let harvests = db::list_owner_harvests(&*db, owner_id).await?;
        let losses = db::list_owner_mortality(&*db, owner_id).await?;
        Ok::<_, String>((stockings, harvests, losses))
    }
    .await;
    drop(db);

    match loaded {
        Ok((stockings, harvests, losses)) => analytics::summarize(&stockings, &harvests, &losses),
        Err(err) => {
            tracing::warn!(owner_id, error = %err, "analytics unavailable, returning zeroed summary");
            AnalyticsSummary::default()
        }
    }
}

pub fn predict_yield(
    state: &AppState,
    payload: PredictionRequest,
) -> Result<PredictionResponse, ServiceError> {
    let features = YieldFeatures::new(payload.fry_quantity, payload.days_cultured, payload.area_sqm)
        .map_err(|err| ServiceError::bad_request("invalid_prediction", err.to_string()))?;
    let estimate = state.yields.estimate(&features);

    tracing::info!(
        fry_quantity = payload.fry_quantity,
        days_cultured = payload.days_cultured,
        predicted_yield_kg = estimate.predicted_yield_kg,
        source = estimate.source,
        "yield predicted"
    );

    Ok(PredictionResponse {
        predicted_yield_kg: estimate.predicted_yield_kg,
        estimated_revenue: estimate.estimated_revenue,
        source: estimate.source,
    })
}

fn image_digest(image: &ImageAttachment) -> String {
    format!("{:x}", Sha256::digest(&image.bytes))
}

pub async fn chat(
    state: &AppState,
    owner_id: &str,
    input: ChatInput,
) -> Result<ChatResponse, ServiceError> {
    let message = input.message.trim();
    if message.is_empty() {
        return Err(ServiceError::bad_request("invalid_chat", "message is required"));
    }
    let digest = input.image.as_ref().map(image_digest);

    {
        let db = state.db.lock().await;
        if let Err(err) =
            db::insert_chat_message(&*db, owner_id, "user", message, digest.as_deref()).await
        {
            tracing::warn!(owner_id, error = %err, "chat history write failed");
        }
    }

    // The provider call can be slow; the connection is not held across it.
    let reply = state.assistant.reply(message, input.image.as_ref()).await;

    {
        let db = state.db.lock().await;
        if let Err(err) = db::insert_chat_message(&*db, owner_id, "bot", &reply.text, None).await {
            tracing::warn!(owner_id, error = %err, "chat history write failed");
        }
    }

    tracing::info!(
        owner_id,
        mode = reply.mode.as_str(),
        with_image = digest.is_some(),
        "assistant replied"
    );

    Ok(ChatResponse {
        response: reply.text,
        mode: reply.mode.as_str(),
    })
}

pub fn chat_history_limit(requested: Option<i64>, default_limit: i64) -> i64 {
    requested.unwrap_or(default_limit).clamp(1, MAX_CHAT_HISTORY)
}

pub async fn chat_history(
    state: &AppState,
    owner_id: &str,
    limit: Option<i64>,
) -> Result<Vec<ChatMessage>, ServiceError> {
    let limit = chat_history_limit(limit, state.chat_history_limit);
    let db = state.db.lock().await;
    db::list_recent_chat(&*db, owner_id, limit)
        .await
        .map_err(|err| ServiceError::database("list chat history failed", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stocking_request(fry_type: &str, quantity: i32, survival: Option<f64>) -> CreateStockingRequest {
        CreateStockingRequest {
            pond_id: 1,
            stocking_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"),
            fry_type: fry_type.to_string(),
            fry_quantity: quantity,
            estimated_survival_rate: survival,
        }
    }

    #[test]
    fn stocking_defaults_survival_rate() {
        let survival = validate_stocking(&stocking_request("Tilapia", 500, None))
            .unwrap_or_else(|_| panic!("expected valid stocking"));
        assert_eq!(survival, DEFAULT_SURVIVAL_RATE);
    }

    #[test]
    fn stocking_collects_every_reason() {
        let Err(err) = validate_stocking(&stocking_request(" ", 0, Some(1.5))) else {
            panic!("expected rejection");
        };
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "invalid_stocking");
        assert_eq!(err.body.reasons.len(), 3);
    }

    #[test]
    fn mortality_rejects_negative_amounts() {
        let payload = CreateMortalityRequest {
            stocking_id: 1,
            loss_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"),
            quantity_lost: -3,
            weight_lost_kg: f64::NAN,
            cause: "Flood".to_string(),
            action_taken: None,
        };
        let Err(err) = validate_mortality(&payload) else {
            panic!("expected rejection");
        };
        assert_eq!(err.body.code, "invalid_mortality");
        assert_eq!(err.body.reasons.len(), 2);
    }

    #[test]
    fn chat_history_limit_is_clamped() {
        assert_eq!(chat_history_limit(None, 50), 50);
        assert_eq!(chat_history_limit(Some(0), 50), 1);
        assert_eq!(chat_history_limit(Some(10_000), 50), MAX_CHAT_HISTORY);
    }

    #[test]
    fn image_digest_is_hex_sha256() {
        let image = ImageAttachment {
            mime_type: "image/jpeg".to_string(),
            bytes: b"abc".to_vec(),
        };
        assert_eq!(
            image_digest(&image),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn aggregates_group_by_pond() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let stockings = vec![
            StockingLog {
                id: 1,
                pond_id: 10,
                stocking_date: date,
                fry_type: "Tilapia".to_string(),
                fry_quantity: 100,
                estimated_survival_rate: 0.85,
            },
            StockingLog {
                id: 2,
                pond_id: 20,
                stocking_date: date,
                fry_type: "Bangus".to_string(),
                fry_quantity: 50,
                estimated_survival_rate: 0.85,
            },
        ];
        let grouped = group_by_pond(stockings);
        assert_eq!(grouped[&10].len(), 1);
        assert_eq!(grouped[&20][0].fry_type, "Bangus");
    }
}
