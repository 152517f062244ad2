//! Selection of the regions that may serve as a regression population.

use crate::config::AdjustmentConfig;
use crate::record::{Outcome, RegionRecord};

/// The outcome whose availability gates a whole request.
pub const PRIMARY_OUTCOME: Outcome = Outcome::DrugDeathRate;

/// True when `record` passes the minimum-scale rule of `config`, if one is set.
///
/// Regions of unknown size never pass an active rule.
pub fn meets_population_rule(record: &RegionRecord, config: &AdjustmentConfig) -> bool {
    match config.min_population {
        None => true,
        Some(minimum) => record.population().is_some_and(|population| population > minimum),
    }
}

/// The regions with a present value of `outcome` that pass the population rule.
pub fn eligible_population<'a>(
    records: &'a [RegionRecord],
    outcome: Outcome,
    config: &AdjustmentConfig,
) -> Vec<&'a RegionRecord> {
    records
        .iter()
        .filter(|record| record.outcome(outcome).is_some())
        .filter(|record| meets_population_rule(record, config))
        .collect()
}

/// Size of the eligible population for the primary outcome, used as the
/// request-wide sufficiency gate.
pub fn eligible_region_count(records: &[RegionRecord], config: &AdjustmentConfig) -> usize {
    records
        .iter()
        .filter(|record| record.outcome(PRIMARY_OUTCOME).is_some())
        .filter(|record| meets_population_rule(record, config))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<RegionRecord> {
        vec![
            RegionRecord::new("1001")
                .with_outcome(Outcome::DrugDeathRate, 10.0)
                .with_population(120_000.0),
            RegionRecord::new("1003")
                .with_outcome(Outcome::SuicideRate, 14.0)
                .with_population(8_000.0),
            RegionRecord::new("1005")
                .with_outcome(Outcome::DrugDeathRate, 30.0)
                .with_outcome(Outcome::SuicideRate, 11.0),
            RegionRecord::new("1007")
                .with_outcome(Outcome::DrugDeathRate, 22.0)
                .with_population(9_500.0),
        ]
    }

    #[test]
    fn filters_on_outcome_presence() {
        let records = sample();
        let config = AdjustmentConfig::default();
        let drug: Vec<&str> = eligible_population(&records, Outcome::DrugDeathRate, &config)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(drug, vec!["1001", "1005", "1007"]);

        let suicide = eligible_population(&records, Outcome::SuicideRate, &config);
        assert_eq!(suicide.len(), 2);
        assert!(eligible_population(&records, Outcome::UnemploymentRate, &config).is_empty());
    }

    #[test]
    fn population_rule_excludes_small_and_unknown_regions() {
        let records = sample();
        let config = AdjustmentConfig {
            min_population: Some(9_000.0),
            ..AdjustmentConfig::default()
        };
        let drug: Vec<&str> = eligible_population(&records, Outcome::DrugDeathRate, &config)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(drug, vec!["1001", "1007"]);
        assert_eq!(eligible_region_count(&records, &config), 2);
    }

    #[test]
    fn gate_counts_primary_outcome_only() {
        let records = sample();
        assert_eq!(eligible_region_count(&records, &AdjustmentConfig::default()), 3);
    }
}
