use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::MedispaValuationError;
use crate::types::{with_metadata, ComputationOutput, MarketSnapshot, Money, Multiple, Rate};
use crate::MedispaValuationResult;

use super::assumptions::ValuationAssumptions;
use super::dcf::compute_valuation;
use super::projection::build_projections;

/// Adjusted multiples outside this range are clipped rather than
/// extrapolated; private-clinic transactions do not clear outside it.
const MULTIPLE_FLOOR: Decimal = dec!(6.0);
const MULTIPLE_CAP: Decimal = dec!(15.0);

/// Catchment-area quality tier for a clinic location.
///
/// Factors are placeholder calibration demonstrating the mechanism;
/// source current transaction data before relying on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationTier {
    /// Dense affluent urban core (e.g. Manhattan, West LA)
    PrimeUrban,
    /// Major metro area
    Metro,
    /// Suburban catchment
    Suburban,
    /// Rural or small-town catchment
    Rural,
}

impl LocationTier {
    pub fn factor(&self) -> Multiple {
        match self {
            LocationTier::PrimeUrban => dec!(1.15),
            LocationTier::Metro => dec!(1.05),
            LocationTier::Suburban => dec!(1.00),
            LocationTier::Rural => dec!(0.88),
        }
    }
}

/// Revenue scale bracket. Larger practices trade at richer multiples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBracket {
    UnderOneMillion,
    OneToThreeMillion,
    ThreeToFiveMillion,
    OverFiveMillion,
}

impl SizeBracket {
    pub fn from_revenue(revenue: Money) -> Self {
        if revenue < dec!(1000000) {
            SizeBracket::UnderOneMillion
        } else if revenue < dec!(3000000) {
            SizeBracket::OneToThreeMillion
        } else if revenue < dec!(5000000) {
            SizeBracket::ThreeToFiveMillion
        } else {
            SizeBracket::OverFiveMillion
        }
    }

    pub fn factor(&self) -> Multiple {
        match self {
            SizeBracket::UnderOneMillion => dec!(0.85),
            SizeBracket::OneToThreeMillion => dec!(0.95),
            SizeBracket::ThreeToFiveMillion => dec!(1.05),
            SizeBracket::OverFiveMillion => dec!(1.15),
        }
    }
}

/// Profitability bracket on EBITDA margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginBracket {
    BelowFifteenPct,
    FifteenToTwentyFivePct,
    AboveTwentyFivePct,
}

impl MarginBracket {
    pub fn from_margin(margin: Rate) -> Self {
        if margin < dec!(0.15) {
            MarginBracket::BelowFifteenPct
        } else if margin <= dec!(0.25) {
            MarginBracket::FifteenToTwentyFivePct
        } else {
            MarginBracket::AboveTwentyFivePct
        }
    }

    pub fn factor(&self) -> Multiple {
        match self {
            MarginBracket::BelowFifteenPct => dec!(0.90),
            MarginBracket::FifteenToTwentyFivePct => dec!(1.00),
            MarginBracket::AboveTwentyFivePct => dec!(1.10),
        }
    }
}

/// Premium for forward revenue growth.
fn growth_factor(growth: Rate) -> Multiple {
    if growth < dec!(0.05) {
        dec!(0.95)
    } else if growth < dec!(0.10) {
        dec!(1.00)
    } else if growth < dec!(0.20) {
        dec!(1.08)
    } else {
        dec!(1.15)
    }
}

/// Comparable-market calibration for the multiple path.
///
/// Size and margin brackets default to being derived from the assumption
/// set when left unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFactors {
    /// Unadjusted sector EV/EBITDA multiple
    pub base_multiple: Multiple,
    pub location: LocationTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeBracket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<MarginBracket>,
}

impl Default for MarketFactors {
    fn default() -> Self {
        MarketFactors {
            base_multiple: dec!(9.0),
            location: LocationTier::Suburban,
            size: None,
            margin: None,
        }
    }
}

/// Output of the market-multiple valuation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleValuation {
    pub base_multiple: Multiple,
    pub location_factor: Multiple,
    pub size_factor: Multiple,
    pub margin_factor: Multiple,
    pub growth_factor: Multiple,
    /// Product of base multiple and all factors, before clipping
    pub unclipped_multiple: Multiple,
    /// Multiple actually applied, clipped to the sane range
    pub adjusted_multiple: Multiple,
    pub final_year_ebitda: Money,
    pub enterprise_value: Money,
    pub equity_value: Money,
}

/// Blend weights for combining the DCF and multiple paths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlendWeights {
    pub dcf_weight: Rate,
    pub multiple_weight: Rate,
}

/// Output of an explicitly requested blended valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendedValuation {
    pub dcf_enterprise_value: Money,
    pub multiple_enterprise_value: Money,
    pub weights: BlendWeights,
    pub enterprise_value: Money,
    pub equity_value: Money,
}

/// Value the clinic off comparable-market multiples instead of DCF.
///
/// EV = final-year EBITDA x (base multiple x location x size x margin x
/// growth factors), with the adjusted multiple clipped to [6.0, 15.0].
/// A supplied market snapshot's industry multiple overrides the
/// configured base multiple.
pub fn valuate_by_multiple(
    assumptions: &ValuationAssumptions,
    factors: &MarketFactors,
    market: Option<&MarketSnapshot>,
) -> MedispaValuationResult<ComputationOutput<MultipleValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let result = compute_multiple_valuation(assumptions, factors, market, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Market-comparable EV/EBITDA multiple",
        &serde_json::json!({
            "assumptions": assumptions,
            "factors": factors,
            "market_as_of": market.map(|m| m.as_of),
        }),
        warnings,
        elapsed,
        result,
    ))
}

pub(crate) fn compute_multiple_valuation(
    assumptions: &ValuationAssumptions,
    factors: &MarketFactors,
    market: Option<&MarketSnapshot>,
    warnings: &mut Vec<String>,
) -> MedispaValuationResult<MultipleValuation> {
    assumptions.validate()?;
    if factors.base_multiple <= Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "base_multiple".into(),
            reason: "Base market multiple must be positive".into(),
        });
    }

    let projections = build_projections(assumptions)?;
    let last = projections.last().ok_or_else(|| {
        MedispaValuationError::InsufficientData("No projection years generated".into())
    })?;

    let base_multiple = match market.and_then(|m| m.industry_ev_ebitda) {
        Some(industry) => {
            warnings.push(format!(
                "Base multiple {} overridden by market snapshot industry multiple {industry}",
                factors.base_multiple
            ));
            industry
        }
        None => factors.base_multiple,
    };

    let location_factor = factors.location.factor();
    let size_factor = factors
        .size
        .unwrap_or_else(|| SizeBracket::from_revenue(assumptions.base_revenue))
        .factor();
    let margin_factor = factors
        .margin
        .unwrap_or_else(|| MarginBracket::from_margin(assumptions.base_ebitda_margin))
        .factor();
    let growth_factor = growth_factor(assumptions.growth_rate_for_year(0));

    let unclipped_multiple =
        base_multiple * location_factor * size_factor * margin_factor * growth_factor;
    let adjusted_multiple = unclipped_multiple.clamp(MULTIPLE_FLOOR, MULTIPLE_CAP);
    if adjusted_multiple != unclipped_multiple {
        warnings.push(format!(
            "Adjusted multiple {unclipped_multiple} clipped to {adjusted_multiple} \
             (range {MULTIPLE_FLOOR}-{MULTIPLE_CAP})"
        ));
    }

    let final_year_ebitda = last.ebitda;
    let enterprise_value = final_year_ebitda * adjusted_multiple;
    let equity_value = enterprise_value - assumptions.net_debt + assumptions.non_operating_assets;

    Ok(MultipleValuation {
        base_multiple,
        location_factor,
        size_factor,
        margin_factor,
        growth_factor,
        unclipped_multiple,
        adjusted_multiple,
        final_year_ebitda,
        enterprise_value,
        equity_value,
    })
}

/// Weighted average of the DCF and multiple paths.
///
/// Blending is an explicit caller choice, never an automatic default;
/// weights must sum to 1.
pub fn valuate_blended(
    assumptions: &ValuationAssumptions,
    factors: &MarketFactors,
    weights: BlendWeights,
    market: Option<&MarketSnapshot>,
) -> MedispaValuationResult<ComputationOutput<BlendedValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if weights.dcf_weight < Decimal::ZERO || weights.multiple_weight < Decimal::ZERO {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "weights".into(),
            reason: "Blend weights cannot be negative".into(),
        });
    }
    let weight_sum = weights.dcf_weight + weights.multiple_weight;
    if (weight_sum - Decimal::ONE).abs() > dec!(0.001) {
        return Err(MedispaValuationError::InvalidAssumption {
            field: "weights".into(),
            reason: format!("Blend weights must sum to 1.0, got {weight_sum}"),
        });
    }

    let dcf = compute_valuation(assumptions)?;
    let multiple = compute_multiple_valuation(assumptions, factors, market, &mut warnings)?;

    let enterprise_value = dcf.enterprise_value * weights.dcf_weight
        + multiple.enterprise_value * weights.multiple_weight;
    let equity_value = enterprise_value - assumptions.net_debt + assumptions.non_operating_assets;

    let result = BlendedValuation {
        dcf_enterprise_value: dcf.enterprise_value,
        multiple_enterprise_value: multiple.enterprise_value,
        weights,
        enterprise_value,
        equity_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Blended DCF / market-multiple valuation",
        &serde_json::json!({
            "assumptions": assumptions,
            "factors": factors,
            "weights": weights,
        }),
        warnings,
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::assumptions::TerminalAssumption;
    use chrono::NaiveDate;
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

    #[test]
    fn test_factor_lookup_and_ev() {
        let factors = MarketFactors {
            base_multiple: dec!(9.0),
            location: LocationTier::Metro,
            size: None,
            margin: None,
        };
        let out = valuate_by_multiple(&clinic_assumptions(), &factors, None)
            .unwrap()
            .result;

        // 3.5M revenue => ThreeToFiveMillion (1.05); 25% margin => mid bracket (1.00);
        // 8.5% growth => 1.00
        assert_eq!(out.location_factor, dec!(1.05));
        assert_eq!(out.size_factor, dec!(1.05));
        assert_eq!(out.margin_factor, dec!(1.00));
        assert_eq!(out.growth_factor, dec!(1.00));

        let expected_multiple = dec!(9.0) * dec!(1.05) * dec!(1.05);
        assert_eq!(out.adjusted_multiple, expected_multiple);
        assert_eq!(
            out.enterprise_value,
            out.final_year_ebitda * expected_multiple
        );
    }

    #[test]
    fn test_multiple_clipped_at_cap() {
        let mut a = clinic_assumptions();
        a.revenue_growth_rates = vec![dec!(0.25)];
        a.base_ebitda_margin = dec!(0.32);
        let factors = MarketFactors {
            base_multiple: dec!(13.0),
            location: LocationTier::PrimeUrban,
            size: Some(SizeBracket::OverFiveMillion),
            margin: None,
        };
        let out = valuate_by_multiple(&a, &factors, None).unwrap();
        // 13.0 * 1.15 * 1.15 * 1.10 * 1.15 is far above the cap
        assert!(out.result.unclipped_multiple > dec!(15.0));
        assert_eq!(out.result.adjusted_multiple, dec!(15.0));
        assert!(out.warnings.iter().any(|w| w.contains("clipped")));
    }

    #[test]
    fn test_multiple_clipped_at_floor() {
        let mut a = clinic_assumptions();
        a.base_revenue = dec!(800000);
        a.revenue_growth_rates = vec![dec!(0.01)];
        a.base_ebitda_margin = dec!(0.10);
        let factors = MarketFactors {
            base_multiple: dec!(7.0),
            location: LocationTier::Rural,
            size: None,
            margin: None,
        };
        let out = valuate_by_multiple(&a, &factors, None).unwrap().result;
        // 7.0 * 0.88 * 0.85 * 0.90 * 0.95 ≈ 4.48, below the floor
        assert!(out.unclipped_multiple < dec!(6.0));
        assert_eq!(out.adjusted_multiple, dec!(6.0));
    }

    #[test]
    fn test_snapshot_overrides_base_multiple() {
        let snapshot = MarketSnapshot {
            as_of: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            risk_free_rate: Some(dec!(0.042)),
            industry_ev_ebitda: Some(dec!(10.5)),
        };
        let out =
            valuate_by_multiple(&clinic_assumptions(), &MarketFactors::default(), Some(&snapshot))
                .unwrap();
        assert_eq!(out.result.base_multiple, dec!(10.5));
        assert!(out.warnings.iter().any(|w| w.contains("overridden")));
    }

    #[test]
    fn test_size_bracket_boundaries() {
        assert_eq!(
            SizeBracket::from_revenue(dec!(999999)),
            SizeBracket::UnderOneMillion
        );
        assert_eq!(
            SizeBracket::from_revenue(dec!(1000000)),
            SizeBracket::OneToThreeMillion
        );
        assert_eq!(
            SizeBracket::from_revenue(dec!(5000000)),
            SizeBracket::OverFiveMillion
        );
    }

    #[test]
    fn test_blended_is_weighted_average() {
        let a = clinic_assumptions();
        let factors = MarketFactors::default();
        let weights = BlendWeights {
            dcf_weight: dec!(0.6),
            multiple_weight: dec!(0.4),
        };
        let blended = valuate_blended(&a, &factors, weights, None).unwrap().result;

        let expected = blended.dcf_enterprise_value * dec!(0.6)
            + blended.multiple_enterprise_value * dec!(0.4);
        assert_eq!(blended.enterprise_value, expected);
    }

    #[test]
    fn test_blend_weights_must_sum_to_one() {
        let weights = BlendWeights {
            dcf_weight: dec!(0.6),
            multiple_weight: dec!(0.6),
        };
        assert!(valuate_blended(
            &clinic_assumptions(),
            &MarketFactors::default(),
            weights,
            None
        )
        .is_err());
    }

    #[test]
    fn test_zero_base_multiple_rejected() {
        let factors = MarketFactors {
            base_multiple: Decimal::ZERO,
            ..MarketFactors::default()
        };
        assert!(valuate_by_multiple(&clinic_assumptions(), &factors, None).is_err());
    }
}
