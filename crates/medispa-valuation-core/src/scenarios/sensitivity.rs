use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{with_metadata, ComputationOutput, OutputMetric};
use crate::valuation::assumptions::{AssumptionField, ValuationAssumptions};
use crate::valuation::dcf::compute_valuation;
use crate::MedispaValuationResult;

/// One axis of a 2-way sensitivity sweep: a named assumption and the
/// ordered values to evaluate it at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityAxis {
    pub parameter: AssumptionField,
    pub values: Vec<Decimal>,
}

impl SensitivityAxis {
    pub fn new(parameter: AssumptionField, values: Vec<Decimal>) -> Self {
        SensitivityAxis { parameter, values }
    }

    /// Build an axis from min to max with a positive step; max is always
    /// included even when the step does not land exactly on it.
    pub fn from_range(
        parameter: AssumptionField,
        min: Decimal,
        max: Decimal,
        step: Decimal,
    ) -> MedispaValuationResult<Self> {
        if step <= Decimal::ZERO {
            return Err(MedispaValuationError::InvalidAssumption {
                field: format!("axis:{parameter}"),
                reason: "Step must be positive".into(),
            });
        }
        if min > max {
            return Err(MedispaValuationError::InvalidAssumption {
                field: format!("axis:{parameter}"),
                reason: "Min must be <= max".into(),
            });
        }

        let mut values = Vec::new();
        let mut current = min;
        while current <= max {
            values.push(current);
            current += step;
        }
        if let Some(&last) = values.last() {
            if last < max {
                values.push(max);
            }
        }
        if values.is_empty() {
            values.push(min);
        }

        Ok(SensitivityAxis { parameter, values })
    }
}

/// Output of a 2-way sensitivity sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub parameter_a: AssumptionField,
    pub parameter_b: AssumptionField,
    pub values_a: Vec<Decimal>,
    pub values_b: Vec<Decimal>,
    pub metric: OutputMetric,
    /// matrix[i][j] = metric when parameter_a = values_a[i] and
    /// parameter_b = values_b[j]
    pub matrix: Vec<Vec<Decimal>>,
    /// Metric of the unmodified base assumptions
    pub base_case_value: Decimal,
}

/// Re-run the valuation engine across the Cartesian product of two
/// assumption sweeps.
///
/// Pure Decimal arithmetic end to end: identical inputs give a
/// bit-for-bit identical grid. A failing cell aborts the whole sweep
/// with the offending parameter pair in the error; cells are never
/// silently dropped or zeroed.
pub fn run_sensitivity(
    base: &ValuationAssumptions,
    axis_a: &SensitivityAxis,
    axis_b: &SensitivityAxis,
    metric: OutputMetric,
) -> MedispaValuationResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    for axis in [axis_a, axis_b] {
        if axis.values.is_empty() {
            return Err(MedispaValuationError::InvalidAssumption {
                field: format!("axis:{}", axis.parameter),
                reason: "Axis must contain at least one value".into(),
            });
        }
    }

    let base_case_value = compute_valuation(base)?.metric(metric);

    let mut matrix = Vec::with_capacity(axis_a.values.len());
    for a in &axis_a.values {
        let mut row = Vec::with_capacity(axis_b.values.len());
        for b in &axis_b.values {
            let cell = base
                .with_override(axis_a.parameter, *a)
                .and_then(|overridden| overridden.with_override(axis_b.parameter, *b))
                .and_then(|overridden| compute_valuation(&overridden))
                .map_err(|e| MedispaValuationError::GridEvaluation {
                    parameter_a: axis_a.parameter.to_string(),
                    value_a: *a,
                    parameter_b: axis_b.parameter.to_string(),
                    value_b: *b,
                    source: Box::new(e),
                })?;
            row.push(cell.metric(metric));
        }
        matrix.push(row);
    }

    let output = SensitivityGrid {
        parameter_a: axis_a.parameter,
        parameter_b: axis_b.parameter,
        values_a: axis_a.values.clone(),
        values_b: axis_b.values.clone(),
        metric,
        matrix,
        base_case_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way Sensitivity Analysis",
        &serde_json::json!({
            "parameter_a": axis_a.parameter,
            "parameter_b": axis_b.parameter,
            "metric": metric,
            "base": base,
        }),
        warnings,
        elapsed,
        output,
    ))
}
