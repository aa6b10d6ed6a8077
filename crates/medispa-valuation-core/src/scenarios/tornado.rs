use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, OutputMetric, Rate};
use crate::valuation::assumptions::{AssumptionField, ValuationAssumptions};
use crate::valuation::dcf::compute_valuation;
use crate::MedispaValuationResult;

/// One value driver and its downside/upside shock, as fractions of the
/// base value (-0.20 shocks the driver down 20%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoDriver {
    pub parameter: AssumptionField,
    pub low_pct: Rate,
    pub high_pct: Rate,
}

/// Low/high impact of one driver on the valuation metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoEntry {
    pub parameter: AssumptionField,
    /// Driver value after the downside shock
    pub low_value: Decimal,
    /// Driver value after the upside shock
    pub high_value: Decimal,
    /// Metric change vs the base case under the downside shock
    pub low_delta: Money,
    /// Metric change vs the base case under the upside shock
    pub high_delta: Money,
}

/// Output of a one-way driver-ranking analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoOutput {
    pub base_case_value: Money,
    pub metric: OutputMetric,
    /// Entries sorted descending by absolute high-side delta
    pub entries: Vec<TornadoEntry>,
}

/// Shock each driver one at a time and rank drivers by impact magnitude.
pub fn run_tornado(
    base: &ValuationAssumptions,
    drivers: &[TornadoDriver],
    metric: OutputMetric,
) -> MedispaValuationResult<ComputationOutput<TornadoOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    if drivers.is_empty() {
        return Err(MedispaValuationError::InsufficientData(
            "At least one tornado driver is required".into(),
        ));
    }

    let base_case_value = compute_valuation(base)?.metric(metric);

    let mut entries = Vec::with_capacity(drivers.len());
    for driver in drivers {
        let base_value = base.value_of(driver.parameter)?;
        let low_value = base_value * (Decimal::ONE + driver.low_pct);
        let high_value = base_value * (Decimal::ONE + driver.high_pct);

        let low_result = evaluate_shock(base, driver.parameter, low_value, metric)?;
        let high_result = evaluate_shock(base, driver.parameter, high_value, metric)?;

        entries.push(TornadoEntry {
            parameter: driver.parameter,
            low_value,
            high_value,
            low_delta: low_result - base_case_value,
            high_delta: high_result - base_case_value,
        });
    }

    entries.sort_by(|a, b| b.high_delta.abs().cmp(&a.high_delta.abs()));

    let output = TornadoOutput {
        base_case_value,
        metric,
        entries,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-Way Tornado Analysis",
        &serde_json::json!({
            "drivers": drivers,
            "metric": metric,
            "base": base,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn evaluate_shock(
    base: &ValuationAssumptions,
    parameter: AssumptionField,
    value: Decimal,
    metric: OutputMetric,
) -> MedispaValuationResult<Money> {
    let result = base
        .with_override(parameter, value)
        .and_then(|overridden| compute_valuation(&overridden))
        .map_err(|e| MedispaValuationError::DriverEvaluation {
            parameter: parameter.to_string(),
            value,
            source: Box::new(e),
        })?;
    Ok(result.metric(metric))
}
