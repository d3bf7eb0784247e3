use chrono::Datelike;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::models::{HarvestLog, MortalityLog, StockingLog};

pub const NO_INCIDENTS: &str = "No incidents recorded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MortalityCause {
    Disease,
    Flood,
    Heat,
    Theft,
    Unknown,
}

impl MortalityCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            MortalityCause::Disease => "Disease",
            MortalityCause::Flood => "Flood",
            MortalityCause::Heat => "Heat",
            MortalityCause::Theft => "Theft",
            MortalityCause::Unknown => "Unknown",
        }
    }

    /// Lenient parse used for both request payloads and stored rows.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(MortalityCause::Unknown)
    }

    /// Immediate advice returned when a loss is reported.
    pub fn solution(&self) -> &'static str {
        match self {
            MortalityCause::Flood => "Recommendation: Install overflow pipes and raise dike height by 1 meter before rainy season.",
            MortalityCause::Disease => "Recommendation: Isolate pond immediately. Reduce feeding and apply salt/probiotics. Check water pH.",
            MortalityCause::Heat => "Recommendation: Increase water depth to 1.5m to keep bottom cool. Run aerators at noon.",
            MortalityCause::Theft => "Recommendation: Install motion-sensor lights or fencing around the perimeter.",
            MortalityCause::Unknown => "Recommendation: Monitor water parameters daily to identify the root cause.",
        }
    }

    /// Farm-wide priority shown on the analytics dashboard.
    pub fn priority(&self) -> Option<&'static str> {
        match self {
            MortalityCause::Flood => Some("Priority: Upgrade dike infrastructure."),
            MortalityCause::Disease => Some("Priority: Review water quality protocol."),
            MortalityCause::Heat => Some("Priority: Deepen ponds."),
            MortalityCause::Theft | MortalityCause::Unknown => None,
        }
    }
}

impl fmt::Display for MortalityCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MortalityCause {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flood" => Ok(MortalityCause::Flood),
            "disease" => Ok(MortalityCause::Disease),
            "heat" => Ok(MortalityCause::Heat),
            "theft" => Ok(MortalityCause::Theft),
            "unknown" | "other" => Ok(MortalityCause::Unknown),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearlyChart {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_revenue: f64,
    pub total_kg: f64,
    pub total_stocked: i64,
    pub total_loss_qty: i64,
    pub total_loss_kg: f64,
    pub survival_rate: f64,
    pub yearly_chart: YearlyChart,
    pub top_cause: Option<String>,
    pub system_recommendation: String,
}

impl Default for AnalyticsSummary {
    fn default() -> Self {
        Self {
            total_revenue: 0.0,
            total_kg: 0.0,
            total_stocked: 0,
            total_loss_qty: 0,
            total_loss_kg: 0.0,
            survival_rate: 0.0,
            yearly_chart: YearlyChart::default(),
            top_cause: None,
            system_recommendation: NO_INCIDENTS.to_string(),
        }
    }
}

/// Rolls up one owner's cycles. Callers pass only rows the owner can see.
pub fn summarize(
    stockings: &[StockingLog],
    harvests: &[HarvestLog],
    losses: &[MortalityLog],
) -> AnalyticsSummary {
    let total_stocked: i64 = stockings
        .iter()
        .map(|stocking| i64::from(stocking.fry_quantity.max(0)))
        .sum();

    let mut total_revenue = 0.0;
    let mut total_kg = 0.0;
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for harvest in harvests {
        total_revenue += harvest.total_weight_kg * harvest.market_price_per_kg;
        total_kg += harvest.total_weight_kg;
        *by_year.entry(harvest.harvest_date.year()).or_default() += harvest.total_weight_kg;
    }

    let total_loss_qty: i64 = losses
        .iter()
        .map(|loss| i64::from(loss.quantity_lost.max(0)))
        .sum();
    let total_loss_kg: f64 = losses.iter().map(|loss| loss.weight_lost_kg).sum();

    let top_cause = most_frequent_cause(losses);
    let system_recommendation = top_cause
        .and_then(|cause| cause.priority())
        .unwrap_or(NO_INCIDENTS)
        .to_string();

    AnalyticsSummary {
        total_revenue,
        total_kg,
        total_stocked,
        total_loss_qty,
        total_loss_kg,
        survival_rate: survival_rate(total_stocked, total_loss_qty),
        yearly_chart: YearlyChart {
            labels: by_year.keys().map(|year| year.to_string()).collect(),
            data: by_year.into_values().collect(),
        },
        top_cause: top_cause.map(|cause| cause.to_string()),
        system_recommendation,
    }
}

pub fn survival_rate(stocked: i64, dead: i64) -> f64 {
    if stocked <= 0 {
        return 0.0;
    }
    ((stocked - dead) as f64 / stocked as f64 * 100.0).max(0.0)
}

/// Ties go to the alphabetically first cause label.
pub fn most_frequent_cause(losses: &[MortalityLog]) -> Option<MortalityCause> {
    let mut counts: BTreeMap<&'static str, (MortalityCause, usize)> = BTreeMap::new();
    for loss in losses {
        let cause = MortalityCause::from_label(&loss.cause);
        counts.entry(cause.as_str()).or_insert((cause, 0)).1 += 1;
    }

    // BTreeMap iterates alphabetically; max_by keeps the last maximum, so
    // walk in reverse to let the first label win ties.
    counts
        .values()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map(|(cause, _)| *cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stocking(id: i64, quantity: i32) -> StockingLog {
        StockingLog {
            id,
            pond_id: 1,
            stocking_date: NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date"),
            fry_type: "Tilapia".to_string(),
            fry_quantity: quantity,
            estimated_survival_rate: 0.85,
        }
    }

    fn harvest(stocking_id: i64, year: i32, kg: f64, price: f64) -> HarvestLog {
        HarvestLog {
            id: stocking_id * 10,
            stocking_id,
            harvest_date: NaiveDate::from_ymd_opt(year, 6, 1).expect("valid date"),
            total_weight_kg: kg,
            market_price_per_kg: price,
            revenue: 0.0,
            days_cultured: 120,
            fish_size: None,
        }
    }

    fn loss(cause: &str, quantity: i32) -> MortalityLog {
        MortalityLog {
            id: 1,
            stocking_id: 1,
            loss_date: NaiveDate::from_ymd_opt(2023, 2, 1).expect("valid date"),
            quantity_lost: quantity,
            weight_lost_kg: 1.5,
            cause: cause.to_string(),
            action_taken: None,
        }
    }

    #[test]
    fn survival_rate_cases() {
        assert_eq!(survival_rate(1000, 100), 90.0);
        assert_eq!(survival_rate(0, 0), 0.0);
        assert_eq!(survival_rate(0, 25), 0.0);
        assert_eq!(survival_rate(10, 50), 0.0);
    }

    #[test]
    fn empty_owner_gets_defaults() {
        assert_eq!(summarize(&[], &[], &[]), AnalyticsSummary::default());
    }

    #[test]
    fn totals_and_yearly_buckets() {
        let stockings = vec![stocking(1, 1000), stocking(2, 500), stocking(3, 300)];
        let harvests = vec![
            harvest(1, 2024, 50.0, 150.0),
            harvest(2, 2023, 20.0, 100.0),
            harvest(3, 2024, 30.0, 150.0),
        ];
        let losses = vec![loss("Flood", 60), loss("flood", 40), loss("Heat", 80)];

        let summary = summarize(&stockings, &harvests, &losses);
        assert_eq!(summary.total_revenue, 7500.0 + 2000.0 + 4500.0);
        assert_eq!(summary.total_kg, 100.0);
        assert_eq!(summary.total_stocked, 1800);
        assert_eq!(summary.total_loss_qty, 180);
        assert_eq!(summary.total_loss_kg, 4.5);
        assert_eq!(summary.survival_rate, 90.0);
        assert_eq!(summary.yearly_chart.labels, vec!["2023", "2024"]);
        assert_eq!(summary.yearly_chart.data, vec![20.0, 80.0]);
        assert_eq!(summary.top_cause.as_deref(), Some("Flood"));
        assert_eq!(
            summary.system_recommendation,
            "Priority: Upgrade dike infrastructure."
        );
    }

    #[test]
    fn cause_ties_break_alphabetically() {
        let losses = vec![loss("Heat", 1), loss("Flood", 1), loss("Heat", 1), loss("Flood", 1)];
        assert_eq!(most_frequent_cause(&losses), Some(MortalityCause::Flood));

        let losses = vec![loss("Theft", 1), loss("Disease", 1)];
        assert_eq!(most_frequent_cause(&losses), Some(MortalityCause::Disease));
    }

    #[test]
    fn unrecognized_cause_uses_generic_message() {
        let summary = summarize(&[stocking(1, 10)], &[], &[loss("Meteor", 1)]);
        assert_eq!(summary.top_cause.as_deref(), Some("Unknown"));
        assert_eq!(summary.system_recommendation, NO_INCIDENTS);
    }

    #[test]
    fn theft_has_no_farm_wide_priority() {
        let summary = summarize(&[stocking(1, 10)], &[], &[loss("Theft", 3)]);
        assert_eq!(summary.top_cause.as_deref(), Some("Theft"));
        assert_eq!(summary.system_recommendation, NO_INCIDENTS);
    }

    #[test]
    fn cause_labels_parse_leniently() {
        assert_eq!(MortalityCause::from_label(" DISEASE "), MortalityCause::Disease);
        assert_eq!(MortalityCause::from_label("other"), MortalityCause::Unknown);
        assert_eq!(MortalityCause::from_label("typhoon"), MortalityCause::Unknown);
        assert!(MortalityCause::Theft.solution().contains("fencing"));
    }
}
