use std::collections::HashSet;
use tokio_postgres::{Client, Error, GenericClient, Row};

use crate::models::{ChatMessage, HarvestLog, MortalityLog, OwnedStocking, Pond, StockingLog};

const MIGRATION_INIT: &str = include_str!("../migrations/0001_init.sql");

const SQL_PING: &str = "SELECT 1";

const SQL_INSERT_POND: &str = "INSERT INTO ponds (owner_id, name, location_desc, coordinates, area_sqm, image_base64) \
VALUES ($1, $2, $3, $4, $5, $6) \
RETURNING id, owner_id, name, location_desc, coordinates, area_sqm, image_base64, created_at::text AS created_at";
const SQL_LIST_PONDS: &str = "SELECT id, owner_id, name, location_desc, coordinates, area_sqm, image_base64, created_at::text AS created_at \
FROM ponds WHERE owner_id = $1 ORDER BY id";
const SQL_SELECT_POND: &str = "SELECT id, owner_id, name, location_desc, coordinates, area_sqm, image_base64, created_at::text AS created_at \
FROM ponds WHERE id = $1 AND owner_id = $2";

const SQL_INSERT_STOCKING: &str = "INSERT INTO stocking_logs (pond_id, stocking_date, fry_type, fry_quantity, estimated_survival_rate) \
VALUES ($1, $2, $3, $4, $5) \
RETURNING id, pond_id, stocking_date, fry_type, fry_quantity, estimated_survival_rate";
const SQL_LIST_OWNER_STOCKINGS: &str = "SELECT s.id, s.pond_id, s.stocking_date, s.fry_type, s.fry_quantity, s.estimated_survival_rate \
FROM stocking_logs s JOIN ponds p ON p.id = s.pond_id \
WHERE p.owner_id = $1 ORDER BY s.stocking_date, s.id";
const SQL_LIST_POND_STOCKINGS: &str = "SELECT id, pond_id, stocking_date, fry_type, fry_quantity, estimated_survival_rate \
FROM stocking_logs WHERE pond_id = $1 ORDER BY stocking_date, id";
const SQL_SELECT_OWNED_STOCKING: &str = "SELECT s.id, s.pond_id, s.stocking_date, s.fry_type, s.fry_quantity, s.estimated_survival_rate, p.name AS pond_name \
FROM stocking_logs s JOIN ponds p ON p.id = s.pond_id \
WHERE s.id = $1 AND p.owner_id = $2";

const SQL_INSERT_HARVEST: &str = "INSERT INTO harvest_logs (stocking_id, harvest_date, total_weight_kg, market_price_per_kg, revenue, days_cultured, fish_size) \
VALUES ($1, $2, $3, $4, $5, $6, $7) \
RETURNING id, stocking_id, harvest_date, total_weight_kg, market_price_per_kg, revenue, days_cultured, fish_size";
const SQL_LIST_OWNER_HARVESTS: &str = "SELECT h.id, h.stocking_id, h.harvest_date, h.total_weight_kg, h.market_price_per_kg, h.revenue, h.days_cultured, h.fish_size \
FROM harvest_logs h JOIN stocking_logs s ON s.id = h.stocking_id JOIN ponds p ON p.id = s.pond_id \
WHERE p.owner_id = $1";
const SQL_LIST_POND_HARVESTS: &str = "SELECT h.id, h.stocking_id, h.harvest_date, h.total_weight_kg, h.market_price_per_kg, h.revenue, h.days_cultured, h.fish_size \
FROM harvest_logs h JOIN stocking_logs s ON s.id = h.stocking_id \
WHERE s.pond_id = $1";

const SQL_INSERT_MORTALITY: &str = "INSERT INTO mortality_logs (stocking_id, loss_date, quantity_lost, weight_lost_kg, cause, action_taken) \
VALUES ($1, $2, $3, $4, $5, $6) RETURNING id";
const SQL_LIST_OWNER_MORTALITY: &str = "SELECT m.id, m.stocking_id, m.loss_date, m.quantity_lost, m.weight_lost_kg, m.cause, m.action_taken \
FROM mortality_logs m JOIN stocking_logs s ON s.id = m.stocking_id JOIN ponds p ON p.id = s.pond_id \
WHERE p.owner_id = $1";

const SQL_INSERT_CHAT: &str =
    "INSERT INTO chat_history (owner_id, sender, message, image_sha256) VALUES ($1, $2, $3, $4)";
const SQL_LIST_RECENT_CHAT: &str = "SELECT id, sender, message, image_sha256, created_at::text AS created_at FROM ( \
SELECT id, sender, message, image_sha256, created_at FROM chat_history WHERE owner_id = $1 ORDER BY id DESC LIMIT $2 \
) recent ORDER BY id";

pub async fn run_migrations(db: &Client) -> Result<(), Error> {
    db.batch_execute(MIGRATION_INIT).await
}

pub async fn ping(db: &impl GenericClient) -> Result<(), String> {
    db.query_one(SQL_PING, &[])
        .await
        .map_err(|err| format!("ping failed: {err}"))?;
    Ok(())
}

fn pond_from_row(row: &Row) -> Pond {
    let id: i64 = row.get("id");
    let coordinates: serde_json::Value = row.get("coordinates");
    let coordinates = serde_json::from_value(coordinates).unwrap_or_else(|err| {
        tracing::warn!(pond_id = id, error = %err, "stored boundary unreadable");
        Vec::new()
    });
    Pond {
        id,
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        location_desc: row.get("location_desc"),
        coordinates,
        area_sqm: row.get("area_sqm"),
        image_base64: row.get("image_base64"),
        created_at: row.get("created_at"),
    }
}

fn stocking_from_row(row: &Row) -> StockingLog {
    StockingLog {
        id: row.get("id"),
        pond_id: row.get("pond_id"),
        stocking_date: row.get("stocking_date"),
        fry_type: row.get("fry_type"),
        fry_quantity: row.get("fry_quantity"),
        estimated_survival_rate: row.get("estimated_survival_rate"),
    }
}

fn harvest_from_row(row: &Row) -> HarvestLog {
    HarvestLog {
        id: row.get("id"),
        stocking_id: row.get("stocking_id"),
        harvest_date: row.get("harvest_date"),
        total_weight_kg: row.get("total_weight_kg"),
        market_price_per_kg: row.get("market_price_per_kg"),
        revenue: row.get("revenue"),
        days_cultured: row.get("days_cultured"),
        fish_size: row.get("fish_size"),
    }
}

fn mortality_from_row(row: &Row) -> MortalityLog {
    MortalityLog {
        id: row.get("id"),
        stocking_id: row.get("stocking_id"),
        loss_date: row.get("loss_date"),
        quantity_lost: row.get("quantity_lost"),
        weight_lost_kg: row.get("weight_lost_kg"),
        cause: row.get("cause"),
        action_taken: row.get("action_taken"),
    }
}

pub struct NewPond<'a> {
    pub owner_id: &'a str,
    pub name: &'a str,
    pub location_desc: Option<&'a str>,
    pub coordinates: serde_json::Value,
    pub area_sqm: f64,
    pub image_base64: Option<&'a str>,
}

pub async fn insert_pond(db: &impl GenericClient, pond: &NewPond<'_>) -> Result<Pond, Error> {
    let row = db
        .query_one(
            SQL_INSERT_POND,
            &[
                &pond.owner_id,
                &pond.name,
                &pond.location_desc,
                &pond.coordinates,
                &pond.area_sqm,
                &pond.image_base64,
            ],
        )
        .await?;
    Ok(pond_from_row(&row))
}

pub async fn list_ponds(db: &impl GenericClient, owner_id: &str) -> Result<Vec<Pond>, String> {
    let rows = db
        .query(SQL_LIST_PONDS, &[&owner_id])
        .await
        .map_err(|err| format!("list ponds failed: {err}"))?;
    Ok(rows.iter().map(pond_from_row).collect())
}

pub async fn select_pond(
    db: &impl GenericClient,
    pond_id: i64,
    owner_id: &str,
) -> Result<Option<Pond>, String> {
    let row = db
        .query_opt(SQL_SELECT_POND, &[&pond_id, &owner_id])
        .await
        .map_err(|err| format!("select pond failed: {err}"))?;
    Ok(row.as_ref().map(pond_from_row))
}

pub async fn insert_stocking(
    db: &impl GenericClient,
    pond_id: i64,
    stocking: &crate::models::CreateStockingRequest,
    estimated_survival_rate: f64,
) -> Result<StockingLog, Error> {
    let fry_type = stocking.fry_type.trim();
    let row = db
        .query_one(
            SQL_INSERT_STOCKING,
            &[
                &pond_id,
                &stocking.stocking_date,
                &fry_type,
                &stocking.fry_quantity,
                &estimated_survival_rate,
            ],
        )
        .await?;
    Ok(stocking_from_row(&row))
}

pub async fn list_owner_stockings(
    db: &impl GenericClient,
    owner_id: &str,
) -> Result<Vec<StockingLog>, String> {
    let rows = db
        .query(SQL_LIST_OWNER_STOCKINGS, &[&owner_id])
        .await
        .map_err(|err| format!("list stockings failed: {err}"))?;
    Ok(rows.iter().map(stocking_from_row).collect())
}

pub async fn list_pond_stockings(
    db: &impl GenericClient,
    pond_id: i64,
) -> Result<Vec<StockingLog>, String> {
    let rows = db
        .query(SQL_LIST_POND_STOCKINGS, &[&pond_id])
        .await
        .map_err(|err| format!("list pond stockings failed: {err}"))?;
    Ok(rows.iter().map(stocking_from_row).collect())
}

pub async fn select_owned_stocking(
    db: &impl GenericClient,
    stocking_id: i64,
    owner_id: &str,
) -> Result<Option<OwnedStocking>, String> {
    let row = db
        .query_opt(SQL_SELECT_OWNED_STOCKING, &[&stocking_id, &owner_id])
        .await
        .map_err(|err| format!("select stocking failed: {err}"))?;
    Ok(row.map(|row| OwnedStocking {
        stocking: stocking_from_row(&row),
        pond_name: row.get("pond_name"),
    }))
}

pub struct NewHarvest<'a> {
    pub stocking_id: i64,
    pub harvest_date: chrono::NaiveDate,
    pub total_weight_kg: f64,
    pub market_price_per_kg: f64,
    pub revenue: f64,
    pub days_cultured: i32,
    pub fish_size: Option<&'a str>,
}

pub async fn insert_harvest(db: &impl GenericClient, harvest: &NewHarvest<'_>) -> Result<HarvestLog, Error> {
    let row = db
        .query_one(
            SQL_INSERT_HARVEST,
            &[
                &harvest.stocking_id,
                &harvest.harvest_date,
                &harvest.total_weight_kg,
                &harvest.market_price_per_kg,
                &harvest.revenue,
                &harvest.days_cultured,
                &harvest.fish_size,
            ],
        )
        .await?;
    Ok(harvest_from_row(&row))
}

pub async fn list_owner_harvests(
    db: &impl GenericClient,
    owner_id: &str,
) -> Result<Vec<HarvestLog>, String> {
    let rows = db
        .query(SQL_LIST_OWNER_HARVESTS, &[&owner_id])
        .await
        .map_err(|err| format!("list harvests failed: {err}"))?;
    Ok(rows.iter().map(harvest_from_row).collect())
}

pub async fn list_pond_harvests(
    db: &impl GenericClient,
    pond_id: i64,
) -> Result<Vec<HarvestLog>, String> {
    let rows = db
        .query(SQL_LIST_POND_HARVESTS, &[&pond_id])
        .await
        .map_err(|err| format!("list pond harvests failed: {err}"))?;
    Ok(rows.iter().map(harvest_from_row).collect())
}

pub fn harvested_ids(harvests: &[HarvestLog]) -> HashSet<i64> {
    harvests.iter().map(|harvest| harvest.stocking_id).collect()
}

pub struct NewMortality<'a> {
    pub stocking_id: i64,
    pub loss_date: chrono::NaiveDate,
    pub quantity_lost: i32,
    pub weight_lost_kg: f64,
    pub cause: &'a str,
    pub action_taken: Option<&'a str>,
}

pub async fn insert_mortality(db: &impl GenericClient, loss: &NewMortality<'_>) -> Result<i64, String> {
    let row = db
        .query_one(
            SQL_INSERT_MORTALITY,
            &[
                &loss.stocking_id,
                &loss.loss_date,
                &loss.quantity_lost,
                &loss.weight_lost_kg,
                &loss.cause,
                &loss.action_taken,
            ],
        )
        .await
        .map_err(|err| format!("insert mortality failed: {err}"))?;
    Ok(row.get("id"))
}

pub async fn list_owner_mortality(
    db: &impl GenericClient,
    owner_id: &str,
) -> Result<Vec<MortalityLog>, String> {
    let rows = db
        .query(SQL_LIST_OWNER_MORTALITY, &[&owner_id])
        .await
        .map_err(|err| format!("list mortality failed: {err}"))?;
    Ok(rows.iter().map(mortality_from_row).collect())
}

pub async fn insert_chat_message(
    db: &impl GenericClient,
    owner_id: &str,
    sender: &str,
    message: &str,
    image_sha256: Option<&str>,
) -> Result<(), String> {
    db.execute(SQL_INSERT_CHAT, &[&owner_id, &sender, &message, &image_sha256])
        .await
        .map_err(|err| format!("insert chat message failed: {err}"))?;
    Ok(())
}

pub async fn list_recent_chat(
    db: &impl GenericClient,
    owner_id: &str,
    limit: i64,
) -> Result<Vec<ChatMessage>, String> {
    let rows = db
        .query(SQL_LIST_RECENT_CHAT, &[&owner_id, &limit])
        .await
        .map_err(|err| format!("list chat history failed: {err}"))?;
    Ok(rows
        .into_iter()
        .map(|row| ChatMessage {
            id: row.get("id"),
            sender: row.get("sender"),
            text: row.get("message"),
            image_sha256: row.get("image_sha256"),
            timestamp: row.get("created_at"),
        })
        .collect())
}
