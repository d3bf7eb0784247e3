use chrono::NaiveDate;
use std::collections::HashSet;

use crate::models::StockingLog;

/// What is currently swimming in a pond.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveStock {
    pub total_fish: i64,
    pub species: Option<String>,
    pub last_stocked_at: Option<NaiveDate>,
}

/// Summarizes the stockings of one pond that have not been harvested yet.
pub fn summarize_active(stockings: &[StockingLog], harvested: &HashSet<i64>) -> ActiveStock {
    let mut active: Vec<&StockingLog> = stockings
        .iter()
        .filter(|stocking| !harvested.contains(&stocking.id))
        .collect();
    active.sort_by_key(|stocking| (stocking.stocking_date, stocking.id));

    let total_fish = active
        .iter()
        .map(|stocking| i64::from(stocking.fry_quantity.max(0)))
        .sum();

    let mut seen = HashSet::new();
    let labels: Vec<&str> = active
        .iter()
        .map(|stocking| stocking.fry_type.trim())
        .filter(|label| !label.is_empty())
        .filter(|label| seen.insert(label.to_lowercase()))
        .collect();

    ActiveStock {
        total_fish,
        species: (!labels.is_empty()).then(|| labels.join(", ")),
        last_stocked_at: active.last().map(|stocking| stocking.stocking_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stocking(id: i64, fry_type: &str, quantity: i32, day: u32) -> StockingLog {
        StockingLog {
            id,
            pond_id: 1,
            stocking_date: NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date"),
            fry_type: fry_type.to_string(),
            fry_quantity: quantity,
            estimated_survival_rate: 0.85,
        }
    }

    #[test]
    fn fully_harvested_pond_is_empty() {
        let stockings = vec![stocking(1, "Tilapia", 500, 1), stocking(2, "Bangus", 300, 2)];
        let harvested: HashSet<i64> = [1, 2].into_iter().collect();
        let summary = summarize_active(&stockings, &harvested);
        assert_eq!(summary.total_fish, 0);
        assert_eq!(summary.species, None);
        assert_eq!(summary.last_stocked_at, None);
    }

    #[test]
    fn species_are_deduplicated_case_insensitively() {
        let stockings = vec![stocking(1, "Tilapia", 200, 1), stocking(2, "tilapia", 300, 5)];
        let summary = summarize_active(&stockings, &HashSet::new());
        assert_eq!(summary.total_fish, 500);
        assert_eq!(summary.species.as_deref(), Some("Tilapia"));
    }

    #[test]
    fn species_follow_stocking_order() {
        let stockings = vec![
            stocking(3, "Bangus", 100, 9),
            stocking(1, "Tilapia", 100, 2),
            stocking(2, "Hito", 100, 4),
        ];
        let harvested: HashSet<i64> = [2].into_iter().collect();
        let summary = summarize_active(&stockings, &harvested);
        assert_eq!(summary.species.as_deref(), Some("Tilapia, Bangus"));
        assert_eq!(summary.total_fish, 200);
        assert_eq!(
            summary.last_stocked_at,
            NaiveDate::from_ymd_opt(2024, 3, 9)
        );
    }
}
