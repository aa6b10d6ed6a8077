use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::time_value::{present_value, present_value_series};
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::MedispaValuationResult;

use super::assumptions::{TerminalAssumption, ValuationAssumptions};
use super::projection::{build_projections, YearProjection};
use super::terminal::{exit_multiple_terminal, gordon_growth_terminal};

/// Output of a DCF valuation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    /// Year-by-year operating projections
    pub projections: Vec<YearProjection>,
    /// Sum of present values of explicit-period free cash flows
    pub pv_of_cash_flows: Money,
    /// Undiscounted continuing value at the horizon
    pub terminal_value: Money,
    /// Present value of the continuing value
    pub pv_of_terminal: Money,
    /// Enterprise value = PV(FCFs) + PV(TV)
    pub enterprise_value: Money,
    /// Equity value = EV - net debt + non-operating assets
    pub equity_value: Money,
    /// EV / final-year EBITDA
    pub implied_multiple: Multiple,
    /// Terminal value as a share of enterprise value
    pub terminal_value_pct: Rate,
    /// Discount rate the run used
    pub discount_rate_used: Rate,
}

impl ValuationResult {
    /// The output the analysis layers record per evaluation.
    pub fn metric(&self, metric: crate::types::OutputMetric) -> Money {
        match metric {
            crate::types::OutputMetric::EnterpriseValue => self.enterprise_value,
            crate::types::OutputMetric::EquityValue => self.equity_value,
        }
    }
}

/// Run a DCF valuation of the clinic.
pub fn valuate(
    assumptions: &ValuationAssumptions,
) -> MedispaValuationResult<ComputationOutput<ValuationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let result = compute_valuation_with_warnings(assumptions, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Unlevered DCF (clinic free cash flow)",
        assumptions,
        warnings,
        elapsed,
        result,
    ))
}

/// Engine core shared with the sensitivity, tornado, scenario, and Monte
/// Carlo layers, which re-run it many times and have no use for the
/// per-run envelope.
pub(crate) fn compute_valuation(
    assumptions: &ValuationAssumptions,
) -> MedispaValuationResult<ValuationResult> {
    let mut warnings = Vec::new();
    compute_valuation_with_warnings(assumptions, &mut warnings)
}

fn compute_valuation_with_warnings(
    assumptions: &ValuationAssumptions,
    warnings: &mut Vec<String>,
) -> MedispaValuationResult<ValuationResult> {
    assumptions.validate()?;

    let projections = build_projections(assumptions)?;
    let last = projections.last().ok_or_else(|| {
        MedispaValuationError::InsufficientData("No projection years generated".into())
    })?;

    let fcfs: Vec<Money> = projections.iter().map(|p| p.free_cash_flow).collect();
    let pv_of_cash_flows = present_value_series(&fcfs, assumptions.discount_rate)?;

    let terminal_value = match assumptions.terminal {
        TerminalAssumption::PerpetuityGrowth { rate } => {
            gordon_growth_terminal(last.free_cash_flow, assumptions.discount_rate, rate)?
        }
        TerminalAssumption::ExitMultiple { multiple } => {
            exit_multiple_terminal(last.ebitda, multiple)?
        }
    };
    let pv_of_terminal = present_value(
        terminal_value,
        assumptions.discount_rate,
        assumptions.forecast_years,
    )?;

    let enterprise_value = pv_of_cash_flows + pv_of_terminal;
    let equity_value = enterprise_value - assumptions.net_debt + assumptions.non_operating_assets;

    let terminal_value_pct = if enterprise_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_of_terminal / enterprise_value
    };
    if terminal_value_pct > dec!(0.75) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
            terminal_value_pct * dec!(100)
        ));
    }

    let implied_multiple = if last.ebitda.is_zero() {
        Decimal::ZERO
    } else {
        enterprise_value / last.ebitda
    };

    Ok(ValuationResult {
        projections,
        pv_of_cash_flows,
        terminal_value,
        pv_of_terminal,
        enterprise_value,
        equity_value,
        implied_multiple,
        terminal_value_pct,
        discount_rate_used: assumptions.discount_rate,
    })
}
