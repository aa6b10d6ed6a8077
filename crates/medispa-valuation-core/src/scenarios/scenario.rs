use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, OutputMetric, Rate};
use crate::valuation::assumptions::{AssumptionField, ValuationAssumptions};
use crate::valuation::dcf::compute_valuation;
use crate::MedispaValuationResult;

/// A named case with a probability and the assumption overrides that
/// define it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub probability: Rate,
    /// Applied to the base assumptions in order
    pub overrides: Vec<(AssumptionField, Decimal)>,
}

/// Result for a single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub probability: Rate,
    pub value: Money,
    pub deviation_from_base: Money,
    pub deviation_pct: Rate,
}

/// Output of scenario analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub base_case_value: Money,
    pub metric: OutputMetric,
    pub results: Vec<ScenarioResult>,
    pub probability_weighted_value: Money,
}

/// Evaluate bear/base/bull style cases through the valuation engine.
///
/// Probabilities must sum to 1 within a small tolerance.
pub fn analyze_scenarios(
    base: &ValuationAssumptions,
    scenarios: &[Scenario],
    metric: OutputMetric,
) -> MedispaValuationResult<ComputationOutput<ScenarioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if scenarios.is_empty() {
        return Err(MedispaValuationError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }

    for s in scenarios {
        if s.probability < Decimal::ZERO || s.probability > Decimal::ONE {
            return Err(MedispaValuationError::InvalidAssumption {
                field: format!("scenario:{} probability", s.name),
                reason: "Probability must be between 0 and 1".into(),
            });
        }
    }
    let total_prob: Decimal = scenarios.iter().map(|s| s.probability).sum();
    let prob_tolerance = dec!(0.001);
    if (total_prob - Decimal::ONE).abs() > prob_tolerance {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "probabilities".into(),
            reason: format!("Probabilities must sum to 1.0 (got {total_prob})"),
        });
    }
    if total_prob != Decimal::ONE {
        warnings.push(format!(
            "Probabilities sum to {total_prob}; treated as approximately 1.0"
        ));
    }

    let base_case_value = compute_valuation(base)?.metric(metric);

    let mut results = Vec::with_capacity(scenarios.len());
    let mut probability_weighted_value = Decimal::ZERO;

    for scenario in scenarios {
        let mut assumptions = base.clone();
        for (field, value) in &scenario.overrides {
            assumptions = assumptions
                .with_override(*field, *value)
                .map_err(|e| MedispaValuationError::DriverEvaluation {
                    parameter: field.to_string(),
                    value: *value,
                    source: Box::new(e),
                })?;
        }
        let value = compute_valuation(&assumptions)?.metric(metric);

        let deviation = value - base_case_value;
        let deviation_pct = if base_case_value.is_zero() {
            Decimal::ZERO
        } else {
            deviation / base_case_value
        };

        probability_weighted_value += scenario.probability * value;

        results.push(ScenarioResult {
            name: scenario.name.clone(),
            probability: scenario.probability,
            value,
            deviation_from_base: deviation,
            deviation_pct,
        });
    }

    let output = ScenarioOutput {
        base_case_value,
        metric,
        results,
        probability_weighted_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bear/Base/Bull Scenario Analysis",
        &serde_json::json!({
            "num_scenarios": scenarios.len(),
            "metric": metric,
            "base": base,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::assumptions::TerminalAssumption;
    use rust_decimal_macros::dec;

    fn clinic_assumptions() -> ValuationAssumptions {
        ValuationAssumptions {
            base_revenue: dec!(3500000),
            base_ebitda_margin: dec!(0.25),
            target_ebitda_margin: None,
            revenue_growth_rates: vec![dec!(0.085)],
            da_pct_of_revenue: dec!(0.025),
            capex_pct_of_revenue: dec!(0.03),
            nwc_pct_of_revenue_delta: dec!(0.01),
            tax_rate: dec!(0.26),
            discount_rate: dec!(0.12),
            terminal: TerminalAssumption::ExitMultiple {
                multiple: dec!(8.2),
            },
            forecast_years: 5,
            net_debt: Decimal::ZERO,
            non_operating_assets: Decimal::ZERO,
        }
    }

    fn bear_base_bull() -> Vec<Scenario> {
        vec![
            Scenario {
                name: "Bear".into(),
                probability: dec!(0.25),
                overrides: vec![
                    (AssumptionField::RevenueGrowth, dec!(0.02)),
                    (AssumptionField::EbitdaMargin, dec!(0.20)),
                ],
            },
            Scenario {
                name: "Base".into(),
                probability: dec!(0.50),
                overrides: vec![],
            },
            Scenario {
                name: "Bull".into(),
                probability: dec!(0.25),
                overrides: vec![
                    (AssumptionField::RevenueGrowth, dec!(0.14)),
                    (AssumptionField::EbitdaMargin, dec!(0.29)),
                ],
            },
        ]
    }

    #[test]
    fn test_base_scenario_matches_base_case() {
        let out = analyze_scenarios(
            &clinic_assumptions(),
            &bear_base_bull(),
            OutputMetric::EnterpriseValue,
        )
        .unwrap()
        .result;

        let base = out.results.iter().find(|r| r.name == "Base").unwrap();
        assert_eq!(base.value, out.base_case_value);
        assert_eq!(base.deviation_from_base, Decimal::ZERO);
    }

    #[test]
    fn test_bear_below_bull_above() {
        let out = analyze_scenarios(
            &clinic_assumptions(),
            &bear_base_bull(),
            OutputMetric::EnterpriseValue,
        )
        .unwrap()
        .result;

        let bear = out.results.iter().find(|r| r.name == "Bear").unwrap();
        let bull = out.results.iter().find(|r| r.name == "Bull").unwrap();
        assert!(bear.deviation_from_base < Decimal::ZERO);
        assert!(bull.deviation_from_base > Decimal::ZERO);
    }

    #[test]
    fn test_probability_weighting() {
        let out = analyze_scenarios(
            &clinic_assumptions(),
            &bear_base_bull(),
            OutputMetric::EnterpriseValue,
        )
        .unwrap()
        .result;

        let expected: Decimal = out
            .results
            .iter()
            .map(|r| r.probability * r.value)
            .sum();
        assert_eq!(out.probability_weighted_value, expected);

        // Weighted value lies between bear and bull
        let bear = out.results.iter().find(|r| r.name == "Bear").unwrap();
        let bull = out.results.iter().find(|r| r.name == "Bull").unwrap();
        assert!(out.probability_weighted_value > bear.value);
        assert!(out.probability_weighted_value < bull.value);
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let mut scenarios = bear_base_bull();
        scenarios[0].probability = dec!(0.10);
        assert!(analyze_scenarios(
            &clinic_assumptions(),
            &scenarios,
            OutputMetric::EquityValue
        )
        .is_err());
    }

    #[test]
    fn test_empty_scenarios_rejected() {
        assert!(
            analyze_scenarios(&clinic_assumptions(), &[], OutputMetric::EquityValue).is_err()
        );
    }

    #[test]
    fn test_negative_probability_rejected() {
        let mut scenarios = bear_base_bull();
        scenarios[0].probability = dec!(-0.25);
        scenarios[1].probability = dec!(1.00);
        assert!(analyze_scenarios(
            &clinic_assumptions(),
            &scenarios,
            OutputMetric::EquityValue
        )
        .is_err());
    }
}
