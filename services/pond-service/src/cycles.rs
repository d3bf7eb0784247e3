use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{HarvestLog, StockingLog};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum CycleError {
    #[error("harvest date {harvest} cannot be before stocking date {stocked}")]
    HarvestBeforeStocking { stocked: NaiveDate, harvest: NaiveDate },
    #[error("{field} must be a non-negative number")]
    InvalidAmount { field: &'static str },
}

/// Derived columns of a harvest, computed once when it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestFigures {
    pub days_cultured: i32,
    pub revenue: f64,
}

pub fn derive_harvest(
    stocking_date: NaiveDate,
    harvest_date: NaiveDate,
    total_weight_kg: f64,
    market_price_per_kg: f64,
) -> Result<HarvestFigures, CycleError> {
    let days = (harvest_date - stocking_date).num_days();
    if days < 0 {
        return Err(CycleError::HarvestBeforeStocking {
            stocked: stocking_date,
            harvest: harvest_date,
        });
    }
    ensure_amount("total_weight_kg", total_weight_kg)?;
    ensure_amount("market_price_per_kg", market_price_per_kg)?;

    Ok(HarvestFigures {
        days_cultured: i32::try_from(days).unwrap_or(i32::MAX),
        revenue: total_weight_kg * market_price_per_kg,
    })
}

fn ensure_amount(field: &'static str, value: f64) -> Result<(), CycleError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CycleError::InvalidAmount { field })
    }
}

/// One closed production cycle: a stocking joined with its harvest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub stocking_id: i64,
    pub fry_type: String,
    pub quantity_stocked: i32,
    pub stock_date: NaiveDate,
    pub harvest_date: NaiveDate,
    pub days_cultured: i64,
    pub total_weight_kg: f64,
    pub market_price_per_kg: f64,
    pub revenue: f64,
    pub fish_size: String,
}

/// Pairs stockings with their harvests, newest harvest first. Stockings
/// still in the water are left out.
pub fn match_cycles(stockings: &[StockingLog], harvests: &[HarvestLog]) -> Vec<HistoryItem> {
    let by_stocking: HashMap<i64, &HarvestLog> = harvests
        .iter()
        .map(|harvest| (harvest.stocking_id, harvest))
        .collect();

    let mut items: Vec<HistoryItem> = stockings
        .iter()
        .filter_map(|stock| {
            let harvest = by_stocking.get(&stock.id)?;
            Some(HistoryItem {
                stocking_id: stock.id,
                fry_type: stock.fry_type.clone(),
                quantity_stocked: stock.fry_quantity,
                stock_date: stock.stocking_date,
                harvest_date: harvest.harvest_date,
                days_cultured: (harvest.harvest_date - stock.stocking_date).num_days(),
                total_weight_kg: harvest.total_weight_kg,
                market_price_per_kg: harvest.market_price_per_kg,
                // The stored revenue column is not trusted; recompute it.
                revenue: harvest.total_weight_kg * harvest.market_price_per_kg,
                fish_size: harvest
                    .fish_size
                    .clone()
                    .unwrap_or_else(|| "Standard".to_string()),
            })
        })
        .collect();

    items.sort_by(|a, b| {
        b.harvest_date
            .cmp(&a.harvest_date)
            .then(b.stocking_id.cmp(&a.stocking_id))
    });
    items
}

/// Applies 1-based paging. With neither bound set the full list is kept.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>, limit: Option<usize>) -> Vec<T> {
    if page.is_none() && limit.is_none() {
        return items;
    }
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = (page - 1).saturating_mul(limit);
    items.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
    }

    fn stocking(id: i64, day: u32) -> StockingLog {
        StockingLog {
            id,
            pond_id: 7,
            stocking_date: date(1, day),
            fry_type: "Tilapia".to_string(),
            fry_quantity: 500,
            estimated_survival_rate: 0.85,
        }
    }

    fn harvest(id: i64, stocking_id: i64, harvest_date: NaiveDate, kg: f64, price: f64) -> HarvestLog {
        HarvestLog {
            id,
            stocking_id,
            harvest_date,
            total_weight_kg: kg,
            market_price_per_kg: price,
            revenue: -1.0,
            days_cultured: 0,
            fish_size: None,
        }
    }

    #[test]
    fn unharvested_stockings_are_omitted() {
        let stockings = vec![stocking(1, 1), stocking(2, 2)];
        let harvests = vec![harvest(10, 1, date(4, 1), 50.0, 150.0)];
        let items = match_cycles(&stockings, &harvests);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].stocking_id, 1);
        assert_eq!(items[0].revenue, 50.0 * 150.0);
        assert_eq!(items[0].fish_size, "Standard");
    }

    #[test]
    fn newest_harvest_comes_first() {
        let stockings = vec![stocking(1, 1), stocking(2, 2), stocking(3, 3)];
        let harvests = vec![
            harvest(10, 1, date(3, 1), 10.0, 100.0),
            harvest(11, 2, date(6, 1), 10.0, 100.0),
            harvest(12, 3, date(5, 1), 10.0, 100.0),
        ];
        let order: Vec<i64> = match_cycles(&stockings, &harvests)
            .iter()
            .map(|item| item.stocking_id)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn harvest_before_stocking_is_rejected() {
        let err = derive_harvest(date(3, 10), date(3, 9), 10.0, 100.0).unwrap_err();
        assert!(matches!(err, CycleError::HarvestBeforeStocking { .. }));
    }

    #[test]
    fn same_day_harvest_is_allowed() {
        let figures = derive_harvest(date(3, 10), date(3, 10), 2.5, 120.0).expect("valid");
        assert_eq!(figures.days_cultured, 0);
        assert_eq!(figures.revenue, 300.0);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(
            derive_harvest(date(1, 1), date(2, 1), -1.0, 100.0),
            Err(CycleError::InvalidAmount {
                field: "total_weight_kg"
            })
        );
        assert_eq!(
            derive_harvest(date(1, 1), date(2, 1), 1.0, f64::INFINITY),
            Err(CycleError::InvalidAmount {
                field: "market_price_per_kg"
            })
        );
    }

    #[test]
    fn paging_slices_and_defaults() {
        let items: Vec<u32> = (1..=45).collect();
        assert_eq!(paginate(items.clone(), None, None).len(), 45);
        assert_eq!(paginate(items.clone(), Some(2), None), (21..=40).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(3), Some(20)), (41..=45).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(0), Some(5)), vec![1, 2, 3, 4, 5]);
        assert!(paginate(items, Some(10), Some(10)).is_empty());
    }

    #[test]
    fn pond_cycle_end_to_end() {
        use crate::geometry::Boundary;
        use crate::stock::summarize_active;
        use std::collections::HashSet;

        let boundary = Boundary::new(vec![
            [14.0, 121.0],
            [14.0, 121.001],
            [14.001, 121.001],
            [14.001, 121.0],
        ])
        .expect("four corners");
        assert!(boundary.area_sqm() > 0.0);

        let stocked = stocking(1, 5);
        let harvest_date = stocked.stocking_date + chrono::Duration::days(10);
        let figures =
            derive_harvest(stocked.stocking_date, harvest_date, 50.0, 150.0).expect("valid");
        assert_eq!(figures.days_cultured, 10);
        assert_eq!(figures.revenue, 7500.0);

        let mut closed = harvest(1, stocked.id, harvest_date, 50.0, 150.0);
        closed.revenue = figures.revenue;
        closed.days_cultured = figures.days_cultured;

        let history = match_cycles(std::slice::from_ref(&stocked), &[closed]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].revenue, 7500.0);
        assert_eq!(history[0].days_cultured, 10);

        let harvested: HashSet<i64> = [stocked.id].into_iter().collect();
        assert_eq!(summarize_active(&[stocked], &harvested).total_fish, 0);
    }
}
