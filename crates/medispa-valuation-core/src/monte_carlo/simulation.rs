use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{ComputationMetadata, ComputationOutput, OutputMetric};
use crate::valuation::assumptions::{AssumptionField, ValuationAssumptions};
use crate::valuation::dcf::compute_valuation;
use crate::MedispaValuationResult;

/// Iteration counts at or above this evaluate across rayon workers.
const PARALLEL_THRESHOLD: u32 = 1_000;

const HISTOGRAM_BINS: usize = 20;

// ---------------------------------------------------------------------------
// Helper: build ComputationOutput for the f64 statistics layer
// ---------------------------------------------------------------------------

fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution specification for a simulated assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

/// Post-sampling bounds; draws outside are clamped, not redrawn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Clamp {
    pub min: f64,
    pub max: f64,
}

/// One assumption to simulate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McVariable {
    pub parameter: AssumptionField,
    pub distribution: Distribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamp: Option<Clamp>,
}

/// Top-level input for a Monte Carlo valuation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloInput {
    pub iterations: u32,
    /// Optional seed for reproducibility; a random one is drawn and
    /// reported back when absent.
    pub seed: Option<u64>,
    pub variables: Vec<McVariable>,
    pub metric: OutputMetric,
}

/// Percentile summary of the outcome distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Descriptive statistics over all iteration outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    pub histogram: Vec<HistogramBin>,
}

/// Output of a Monte Carlo valuation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloRun {
    pub iterations: u32,
    /// Master seed actually used (echoed or generated)
    pub seed: u64,
    pub metric: OutputMetric,
    /// One valuation outcome per iteration, in iteration order.
    /// Only the scalar survives each iteration; projections do not.
    pub outcomes: Vec<f64>,
    pub summary: McSummary,
}

// ---------------------------------------------------------------------------
// Validation and sampling
// ---------------------------------------------------------------------------

fn validate_variable(var: &McVariable) -> MedispaValuationResult<()> {
    let param = var.parameter.to_string();
    match var.distribution {
        Distribution::Normal { std_dev, .. } => {
            if std_dev <= 0.0 || !std_dev.is_finite() {
                return Err(MedispaValuationError::DistributionSampling {
                    parameter: param,
                    reason: format!("Normal std_dev must be positive, got {std_dev}"),
                });
            }
        }
        Distribution::LogNormal { sigma, .. } => {
            if sigma <= 0.0 || !sigma.is_finite() {
                return Err(MedispaValuationError::DistributionSampling {
                    parameter: param,
                    reason: format!("LogNormal sigma must be positive, got {sigma}"),
                });
            }
        }
        Distribution::Triangular { min, mode, max } => {
            if !(min <= mode && mode <= max && min < max) {
                return Err(MedispaValuationError::DistributionSampling {
                    parameter: param,
                    reason: format!(
                        "Triangular requires min <= mode <= max with min < max, got ({min}, {mode}, {max})"
                    ),
                });
            }
        }
        Distribution::Uniform { min, max } => {
            if min >= max {
                return Err(MedispaValuationError::DistributionSampling {
                    parameter: param,
                    reason: format!("Uniform requires min < max, got ({min}, {max})"),
                });
            }
        }
    }
    if let Some(clamp) = var.clamp {
        if clamp.min > clamp.max {
            return Err(MedispaValuationError::DistributionSampling {
                parameter: param,
                reason: format!(
                    "Clamp bounds inverted: min {} > max {}",
                    clamp.min, clamp.max
                ),
            });
        }
    }
    Ok(())
}

/// Sample one value; distribution parameters were validated up front,
/// so construction failures cannot occur here.
fn sample(rng: &mut StdRng, var: &McVariable) -> MedispaValuationResult<f64> {
    let raw = match var.distribution {
        Distribution::Normal { mean, std_dev } => {
            let n = Normal::new(mean, std_dev).map_err(|e| sampling_error(var, e))?;
            rng.sample(n)
        }
        Distribution::LogNormal { mu, sigma } => {
            let ln = LogNormal::new(mu, sigma).map_err(|e| sampling_error(var, e))?;
            rng.sample(ln)
        }
        Distribution::Triangular { min, mode, max } => {
            let t = Triangular::new(min, max, mode).map_err(|e| sampling_error(var, e))?;
            rng.sample(t)
        }
        Distribution::Uniform { min, max } => {
            let u = Uniform::new(min, max).map_err(|e| sampling_error(var, e))?;
            rng.sample(u)
        }
    };

    Ok(match var.clamp {
        Some(clamp) => raw.clamp(clamp.min, clamp.max),
        None => raw,
    })
}

fn sampling_error(var: &McVariable, e: impl std::fmt::Display) -> MedispaValuationError {
    MedispaValuationError::DistributionSampling {
        parameter: var.parameter.to_string(),
        reason: e.to_string(),
    }
}

/// SplitMix64 finalizer; derives one independent stream seed per
/// iteration from the master seed. Keeps seeded runs identical whether
/// iterations execute sequentially or across rayon workers.
fn iteration_seed(master: u64, iteration: u32) -> u64 {
    let mut z = master.wrapping_add((iteration as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run one iteration: draw every variable, override the cloned
/// assumptions, value the clinic, return the scalar metric.
fn evaluate_iteration(
    base: &ValuationAssumptions,
    variables: &[McVariable],
    metric: OutputMetric,
    seed: u64,
) -> MedispaValuationResult<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut assumptions = base.clone();

    for var in variables {
        let drawn = sample(&mut rng, var)?;
        let value = Decimal::from_f64(drawn).ok_or_else(|| {
            MedispaValuationError::DistributionSampling {
                parameter: var.parameter.to_string(),
                reason: format!("Sampled value {drawn} is not representable"),
            }
        })?;
        assumptions = assumptions.with_override(var.parameter, value)?;
    }

    let result = compute_valuation(&assumptions)?;
    result.metric(metric).to_f64().ok_or_else(|| {
        MedispaValuationError::DistributionSampling {
            parameter: "outcome".into(),
            reason: "Valuation outcome is not representable as f64".into(),
        }
    })
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile from a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Equal-width histogram spanning observed min..max.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| {
            let lower = min_val + i as f64 * bin_width;
            let upper = if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            };
            HistogramBin {
                lower,
                upper,
                count: 0,
                frequency: 0.0,
            }
        })
        .collect();

    for &val in sorted {
        let mut idx = ((val - min_val) / bin_width).floor() as usize;
        if idx >= num_bins {
            idx = num_bins - 1;
        }
        bins[idx].count += 1;
    }

    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }

    bins
}

fn summarize(outcomes: &[f64]) -> McSummary {
    let mut sorted = outcomes.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;

    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    McSummary {
        mean,
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(&sorted, 5.0),
            p10: percentile_sorted(&sorted, 10.0),
            p25: percentile_sorted(&sorted, 25.0),
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
        },
        histogram: build_histogram(&sorted, HISTOGRAM_BINS),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a Monte Carlo valuation.
///
/// Every iteration redraws the simulated assumptions and re-runs the
/// valuation engine; no valuation math is duplicated here. An iteration
/// producing invalid assumptions (e.g. a sampled discount rate at or
/// below a perpetuity growth rate) aborts the run with that iteration's
/// index — constrain such draws with clamp bounds.
///
/// PRNG contract: `StdRng` seeded per iteration via SplitMix64 from the
/// master seed. A fixed seed reproduces the exact outcome sequence in
/// this implementation regardless of thread count; across other
/// implementations only statistical equivalence holds.
pub fn run_monte_carlo(
    base: &ValuationAssumptions,
    input: &MonteCarloInput,
) -> MedispaValuationResult<ComputationOutput<MonteCarloRun>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.iterations < 1 {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "iterations".into(),
            reason: "At least one iteration is required".into(),
        });
    }
    if input.iterations < 100 {
        warnings.push(format!(
            "{} iterations is too few for stable percentiles; 10,000+ recommended",
            input.iterations
        ));
    }
    if input.variables.is_empty() {
        return Err(MedispaValuationError::InsufficientData(
            "At least one simulated variable is required".into(),
        ));
    }
    for var in &input.variables {
        validate_variable(var)?;
    }
    base.validate()?;

    let master_seed = input.seed.unwrap_or_else(rand::random);

    let evaluate = |i: u32| {
        evaluate_iteration(base, &input.variables, input.metric, iteration_seed(master_seed, i))
    };

    let raw: Vec<MedispaValuationResult<f64>> = if input.iterations >= PARALLEL_THRESHOLD {
        (0..input.iterations).into_par_iter().map(evaluate).collect()
    } else {
        (0..input.iterations).map(evaluate).collect()
    };

    // Reduce in index order so the reported failure (and the outcome
    // sequence) is independent of worker scheduling.
    let mut outcomes = Vec::with_capacity(raw.len());
    for (i, r) in raw.into_iter().enumerate() {
        match r {
            Ok(v) => outcomes.push(v),
            Err(e) => {
                return Err(MedispaValuationError::Simulation {
                    iteration: i as u32,
                    source: Box::new(e),
                });
            }
        }
    }

    let summary = summarize(&outcomes);
    let output = MonteCarloRun {
        iterations: input.iterations,
        seed: master_seed,
        metric: input.metric,
        outcomes,
        summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo DCF Valuation",
        &serde_json::json!({
            "iterations": input.iterations,
            "seed": master_seed,
            "metric": input.metric,
            "variables": input.variables,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
