use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{with_metadata, ComputationOutput, MarketSnapshot, Rate};
use crate::MedispaValuationResult;

/// Input parameters for the discount-rate build-up.
///
/// A private clinic has no observable WACC; it is built up from CAPM
/// plus the small-company premiums appropriate to a single-site practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccInput {
    /// Risk-free rate (e.g. 10-year government bond yield)
    pub risk_free_rate: Rate,
    /// Equity risk premium (market return minus risk-free rate)
    pub equity_risk_premium: Rate,
    /// Levered beta for the aesthetics/consumer-health sector
    pub beta: Decimal,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    /// Marginal corporate tax rate
    pub tax_rate: Rate,
    /// Weight of debt in capital structure
    pub debt_weight: Rate,
    /// Weight of equity in capital structure
    pub equity_weight: Rate,
    /// Small-company size premium
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_premium: Option<Rate>,
    /// Clinic-specific risk premium (key-person, single-site concentration)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_risk_premium: Option<Rate>,
}

impl WaccInput {
    /// Take the risk-free rate from a market snapshot when it carries one.
    pub fn with_market_snapshot(mut self, market: &MarketSnapshot) -> Self {
        if let Some(rf) = market.risk_free_rate {
            self.risk_free_rate = rf;
        }
        self
    }
}

/// Output of the WACC calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    pub wacc: Rate,
    pub cost_of_equity: Rate,
    pub after_tax_cost_of_debt: Rate,
}

/// Calculate the Weighted Average Cost of Capital using CAPM.
///
/// Ke = Rf + Beta * ERP + size_premium + specific_risk
/// Kd_at = Kd * (1 - t)
/// WACC = Ke * We + Kd_at * Wd
pub fn calculate_wacc(input: &WaccInput) -> MedispaValuationResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_wacc_input(input)?;

    let weight_sum = input.debt_weight + input.equity_weight;
    if (weight_sum - Decimal::ONE).abs() > dec!(0.01) {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "debt_weight + equity_weight".into(),
            reason: format!("Capital structure weights must sum to 1.0, got {weight_sum}"),
        });
    }

    let mut cost_of_equity = input.risk_free_rate + input.beta * input.equity_risk_premium;
    if let Some(sp) = input.size_premium {
        cost_of_equity += sp;
    }
    if let Some(srp) = input.specific_risk_premium {
        cost_of_equity += srp;
    }

    let after_tax_cost_of_debt = input.cost_of_debt * (Decimal::ONE - input.tax_rate);
    let wacc =
        cost_of_equity * input.equity_weight + after_tax_cost_of_debt * input.debt_weight;

    if wacc > dec!(0.25) {
        warnings.push(format!(
            "WACC of {wacc} exceeds 25%; verify the premium build-up"
        ));
    }

    let output = WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC via CAPM build-up",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn validate_wacc_input(input: &WaccInput) -> MedispaValuationResult<()> {
    if input.risk_free_rate < Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate cannot be negative".into(),
        });
    }
    if input.equity_risk_premium < Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "equity_risk_premium".into(),
            reason: "Equity risk premium cannot be negative".into(),
        });
    }
    if input.beta <= Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "beta".into(),
            reason: "Beta must be positive".into(),
        });
    }
    if input.cost_of_debt < Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "cost_of_debt".into(),
            reason: "Cost of debt cannot be negative".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    if input.debt_weight < Decimal::ZERO || input.equity_weight < Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "debt_weight / equity_weight".into(),
            reason: "Capital structure weights cannot be negative".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    /// Typical single-clinic build-up: sector beta with small-company
    /// and key-person premiums on a mostly-equity capital base.
    fn clinic_wacc_input() -> WaccInput {
        WaccInput {
            risk_free_rate: dec!(0.042),
            equity_risk_premium: dec!(0.055),
            beta: dec!(1.05),
            cost_of_debt: dec!(0.075),
            tax_rate: dec!(0.26),
            debt_weight: dec!(0.20),
            equity_weight: dec!(0.80),
            size_premium: Some(dec!(0.030)),
            specific_risk_premium: Some(dec!(0.020)),
        }
    }

    #[test]
    fn test_clinic_wacc_build_up() {
        let result = calculate_wacc(&clinic_wacc_input()).unwrap();
        let out = &result.result;

        // Ke = 0.042 + 1.05*0.055 + 0.030 + 0.020 = 0.14975
        assert!((out.cost_of_equity - dec!(0.14975)).abs() < dec!(0.0001));
        // Kd_at = 0.075 * 0.74 = 0.0555
        assert!((out.after_tax_cost_of_debt - dec!(0.0555)).abs() < dec!(0.0001));
        // WACC = 0.14975*0.80 + 0.0555*0.20 = 0.1309
        assert!((out.wacc - dec!(0.1309)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_no_premiums() {
        let mut input = clinic_wacc_input();
        input.size_premium = None;
        input.specific_risk_premium = None;
        let result = calculate_wacc(&input).unwrap();
        // Ke = 0.042 + 1.05*0.055 = 0.09975
        assert!((result.result.cost_of_equity - dec!(0.09975)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut input = clinic_wacc_input();
        input.debt_weight = dec!(0.50);
        assert!(calculate_wacc(&input).is_err());
    }

    #[test]
    fn test_negative_risk_free_rejected() {
        let mut input = clinic_wacc_input();
        input.risk_free_rate = dec!(-0.01);
        assert!(calculate_wacc(&input).is_err());
    }

    #[test]
    fn test_zero_beta_rejected() {
        let mut input = clinic_wacc_input();
        input.beta = Decimal::ZERO;
        assert!(calculate_wacc(&input).is_err());
    }

    #[test]
    fn test_snapshot_feeds_risk_free_rate() {
        let snapshot = MarketSnapshot {
            as_of: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            risk_free_rate: Some(dec!(0.038)),
            industry_ev_ebitda: None,
        };
        let input = clinic_wacc_input().with_market_snapshot(&snapshot);
        assert_eq!(input.risk_free_rate, dec!(0.038));
    }

    #[test]
    fn test_high_wacc_warning() {
        let mut input = clinic_wacc_input();
        input.specific_risk_premium = Some(dec!(0.15));
        let result = calculate_wacc(&input).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("exceeds 25%")));
    }
}
