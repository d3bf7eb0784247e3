use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::MortalityCause;

// Stored rows.

#[derive(Debug, Clone)]
pub struct Pond {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub location_desc: Option<String>,
    pub coordinates: Vec<[f64; 2]>,
    pub area_sqm: f64,
    pub image_base64: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StockingLog {
    pub id: i64,
    pub pond_id: i64,
    pub stocking_date: NaiveDate,
    pub fry_type: String,
    pub fry_quantity: i32,
    pub estimated_survival_rate: f64,
}

#[derive(Debug, Clone)]
pub struct HarvestLog {
    pub id: i64,
    pub stocking_id: i64,
    pub harvest_date: NaiveDate,
    pub total_weight_kg: f64,
    pub market_price_per_kg: f64,
    pub revenue: f64,
    pub days_cultured: i32,
    pub fish_size: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MortalityLog {
    pub id: i64,
    pub stocking_id: i64,
    pub loss_date: NaiveDate,
    pub quantity_lost: i32,
    pub weight_lost_kg: f64,
    pub cause: String,
    pub action_taken: Option<String>,
}

/// A stocking joined with the name of the pond it belongs to.
#[derive(Debug, Clone)]
pub struct OwnedStocking {
    pub stocking: StockingLog,
    pub pond_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender: String,
    pub text: String,
    pub image_sha256: Option<String>,
    pub timestamp: String,
}

// Ponds.

#[derive(Deserialize)]
pub struct CreatePondRequest {
    pub name: Option<String>,
    pub location_desc: Option<String>,
    pub coordinates: Vec<[f64; 2]>,
    pub image_base64: Option<String>,
}

#[derive(Serialize)]
pub struct PondResponse {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub location_desc: Option<String>,
    pub coordinates: Vec<[f64; 2]>,
    pub area_sqm: f64,
    pub image_base64: Option<String>,
    pub created_at: String,
    pub total_fish: i64,
    pub active_species: Option<String>,
    pub last_stocked_at: Option<NaiveDate>,
}

// Stocking.

#[derive(Deserialize)]
pub struct CreateStockingRequest {
    pub pond_id: i64,
    pub stocking_date: NaiveDate,
    pub fry_type: String,
    pub fry_quantity: i32,
    pub estimated_survival_rate: Option<f64>,
}

#[derive(Serialize)]
pub struct StockingResponse {
    pub id: i64,
    pub pond_id: i64,
    pub stocking_date: NaiveDate,
    pub fry_type: String,
    pub fry_quantity: i32,
    pub estimated_survival_rate: f64,
}

impl From<StockingLog> for StockingResponse {
    fn from(log: StockingLog) -> Self {
        Self {
            id: log.id,
            pond_id: log.pond_id,
            stocking_date: log.stocking_date,
            fry_type: log.fry_type,
            fry_quantity: log.fry_quantity,
            estimated_survival_rate: log.estimated_survival_rate,
        }
    }
}

#[derive(Serialize)]
pub struct ActiveStockingItem {
    pub id: i64,
    pub pond_id: i64,
    pub label: String,
    pub date: NaiveDate,
}

// Harvest.

#[derive(Deserialize)]
pub struct CreateHarvestRequest {
    pub stocking_id: i64,
    pub harvest_date: NaiveDate,
    pub total_weight_kg: f64,
    pub market_price_per_kg: f64,
    pub fish_size: Option<String>,
}

#[derive(Serialize)]
pub struct HarvestResponse {
    pub id: i64,
    pub stocking_id: i64,
    pub harvest_date: NaiveDate,
    pub days_cultured: i32,
    pub revenue: f64,
    pub fish_size: Option<String>,
}

// Mortality.

#[derive(Deserialize)]
pub struct CreateMortalityRequest {
    pub stocking_id: i64,
    pub loss_date: NaiveDate,
    pub quantity_lost: i32,
    pub weight_lost_kg: f64,
    pub cause: String,
    pub action_taken: Option<String>,
}

impl CreateMortalityRequest {
    pub fn cause(&self) -> MortalityCause {
        MortalityCause::from_label(&self.cause)
    }
}

#[derive(Serialize)]
pub struct MortalityResponse {
    pub id: i64,
    pub cause: String,
    pub solution: &'static str,
}

// History.

#[derive(Deserialize)]
pub struct HistoryParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

// Prediction.

#[derive(Deserialize)]
pub struct PredictionRequest {
    pub fry_quantity: i64,
    pub days_cultured: i64,
    pub area_sqm: f64,
}

#[derive(Serialize)]
pub struct PredictionResponse {
    pub predicted_yield_kg: f64,
    pub estimated_revenue: f64,
    pub source: &'static str,
}

// Chat.

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub mode: &'static str,
}

#[derive(Deserialize)]
pub struct ChatHistoryParams {
    pub limit: Option<i64>,
}

// Misc.

#[derive(Serialize)]
pub struct BannerResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    pub reasons: Vec<String>,
}
