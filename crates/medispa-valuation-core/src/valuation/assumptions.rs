use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MedispaValuationError;
use crate::types::{Money, Multiple, Rate};
use crate::MedispaValuationResult;

/// How continuing value beyond the forecast horizon is computed.
///
/// The parameter lives inside the variant, so a method without its
/// parameter (or with the wrong one) cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum TerminalAssumption {
    /// Gordon growth: TV = FCF_n * (1+g) / (r - g)
    PerpetuityGrowth { rate: Rate },
    /// Exit multiple: TV = EBITDA_n * multiple
    ExitMultiple { multiple: Multiple },
}

/// Normalized financial assumptions for one clinic valuation run.
///
/// Immutable per run; analysis layers derive perturbed copies via
/// [`ValuationAssumptions::with_override`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationAssumptions {
    /// Trailing twelve-month (Year 0) clinic revenue
    pub base_revenue: Money,
    /// EBITDA margin as a fraction of revenue
    pub base_ebitda_margin: Rate,
    /// If set, margin drifts linearly from base to this value over the horizon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ebitda_margin: Option<Rate>,
    /// Year-by-year revenue growth rates; the last rate carries forward
    /// when the vector is shorter than the forecast horizon.
    pub revenue_growth_rates: Vec<Rate>,
    /// Depreciation as a percentage of revenue.
    /// Simplification: no asset schedule is modelled.
    pub da_pct_of_revenue: Rate,
    /// Maintenance + growth capex as a percentage of revenue
    pub capex_pct_of_revenue: Rate,
    /// Working capital consumed per dollar of incremental revenue
    pub nwc_pct_of_revenue_delta: Rate,
    /// Marginal tax rate on operating income
    pub tax_rate: Rate,
    /// Weighted average cost of capital (discount rate)
    pub discount_rate: Rate,
    /// Continuing value method and its parameter
    pub terminal: TerminalAssumption,
    /// Number of explicit forecast years
    pub forecast_years: u32,
    /// Debt minus cash, subtracted in the equity bridge
    pub net_debt: Money,
    /// Excess real estate, investments etc., added in the equity bridge
    pub non_operating_assets: Money,
}

impl ValuationAssumptions {
    /// Validate the full assumption set. Called by the engine before any
    /// computation; nothing is ever partially computed on bad input.
    pub fn validate(&self) -> MedispaValuationResult<()> {
        if self.base_revenue <= Decimal::ZERO {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "base_revenue".into(),
                reason: "Base revenue must be positive".into(),
            });
        }
        if self.forecast_years < 1 {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "forecast_years".into(),
                reason: "Forecast horizon must be at least 1 year".into(),
            });
        }
        if self.base_ebitda_margin <= Decimal::ZERO || self.base_ebitda_margin >= Decimal::ONE {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "base_ebitda_margin".into(),
                reason: "EBITDA margin must be between 0 and 1 (exclusive)".into(),
            });
        }
        if let Some(target) = self.target_ebitda_margin {
            if target <= Decimal::ZERO || target >= Decimal::ONE {
                return Err(MedispaValuationError::InvalidAssumption {
                    field: "target_ebitda_margin".into(),
                    reason: "Target EBITDA margin must be between 0 and 1 (exclusive)".into(),
                });
            }
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "tax_rate".into(),
                reason: "Tax rate must be in [0, 1)".into(),
            });
        }
        for (name, pct) in [
            ("da_pct_of_revenue", self.da_pct_of_revenue),
            ("capex_pct_of_revenue", self.capex_pct_of_revenue),
            ("nwc_pct_of_revenue_delta", self.nwc_pct_of_revenue_delta),
        ] {
            if pct < Decimal::ZERO {
                return Err(MedispaValuationError::InvalidAssumption {
                    field: name.into(),
                    reason: "Percentage-of-revenue assumptions cannot be negative".into(),
                });
            }
        }
        for (idx, g) in self.revenue_growth_rates.iter().enumerate() {
            if *g <= Decimal::NEGATIVE_ONE {
                return Err(MedispaValuationError::InvalidAssumption {
                    field: format!("revenue_growth_rates[{idx}]"),
                    reason: "Growth rate must exceed -100%".into(),
                });
            }
        }
        if self.discount_rate <= Decimal::ZERO {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "discount_rate".into(),
                reason: "Discount rate must be positive".into(),
            });
        }
        if self.non_operating_assets < Decimal::ZERO {
            return Err(MedispaValuationError::InvalidAssumption {
                field: "non_operating_assets".into(),
                reason: "Non-operating assets cannot be negative".into(),
            });
        }

        match self.terminal {
            TerminalAssumption::PerpetuityGrowth { rate } => {
                if rate >= self.discount_rate {
                    return Err(MedispaValuationError::InvalidTerminalAssumption(format!(
                        "Terminal growth rate ({rate}) must be less than the discount rate ({}) \
                         for the perpetuity-growth method",
                        self.discount_rate
                    )));
                }
            }
            TerminalAssumption::ExitMultiple { multiple } => {
                if multiple <= Decimal::ZERO {
                    return Err(MedispaValuationError::InvalidTerminalAssumption(
                        "Exit multiple must be positive".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Growth rate for a given year index, carrying the last rate forward.
    pub(crate) fn growth_rate_for_year(&self, year_idx: u32) -> Rate {
        let idx = year_idx as usize;
        if idx < self.revenue_growth_rates.len() {
            self.revenue_growth_rates[idx]
        } else if let Some(&last) = self.revenue_growth_rates.last() {
            last
        } else {
            Decimal::ZERO
        }
    }

    /// EBITDA margin for a given forecast year (1-based), interpolating
    /// linearly toward the target margin so the final year hits it exactly.
    pub(crate) fn margin_for_year(&self, year_num: u32) -> Rate {
        match self.target_ebitda_margin {
            Some(target) if self.forecast_years > 0 => {
                let step = (target - self.base_ebitda_margin)
                    / Decimal::from(self.forecast_years);
                self.base_ebitda_margin + step * Decimal::from(year_num)
            }
            _ => self.base_ebitda_margin,
        }
    }

    /// Return a copy with one named field replaced.
    ///
    /// The override set per analysis run stays auditable: every perturbed
    /// copy is derived from the base through this method alone. Overriding
    /// a terminal parameter the current method does not carry is an error.
    pub fn with_override(
        &self,
        field: AssumptionField,
        value: Decimal,
    ) -> MedispaValuationResult<Self> {
        let mut out = self.clone();
        match field {
            AssumptionField::BaseRevenue => out.base_revenue = value,
            AssumptionField::EbitdaMargin => out.base_ebitda_margin = value,
            AssumptionField::RevenueGrowth => out.revenue_growth_rates = vec![value],
            AssumptionField::DaPctOfRevenue => out.da_pct_of_revenue = value,
            AssumptionField::CapexPctOfRevenue => out.capex_pct_of_revenue = value,
            AssumptionField::NwcPctOfRevenueDelta => out.nwc_pct_of_revenue_delta = value,
            AssumptionField::TaxRate => out.tax_rate = value,
            AssumptionField::DiscountRate => out.discount_rate = value,
            AssumptionField::TerminalGrowthRate => match out.terminal {
                TerminalAssumption::PerpetuityGrowth { .. } => {
                    out.terminal = TerminalAssumption::PerpetuityGrowth { rate: value };
                }
                TerminalAssumption::ExitMultiple { .. } => {
                    return Err(MedispaValuationError::InvalidAssumption {
                        field: field.to_string(),
                        reason: "Terminal method is exit-multiple; no growth rate to override"
                            .into(),
                    });
                }
            },
            AssumptionField::ExitMultiple => match out.terminal {
                TerminalAssumption::ExitMultiple { .. } => {
                    out.terminal = TerminalAssumption::ExitMultiple { multiple: value };
                }
                TerminalAssumption::PerpetuityGrowth { .. } => {
                    return Err(MedispaValuationError::InvalidAssumption {
                        field: field.to_string(),
                        reason: "Terminal method is perpetuity-growth; no multiple to override"
                            .into(),
                    });
                }
            },
            AssumptionField::NetDebt => out.net_debt = value,
            AssumptionField::NonOperatingAssets => out.non_operating_assets = value,
        }
        Ok(out)
    }

    /// Current scalar value of an overridable field.
    ///
    /// `RevenueGrowth` reads the first-year rate; an empty growth vector
    /// reads as zero.
    pub fn value_of(&self, field: AssumptionField) -> MedispaValuationResult<Decimal> {
        let value = match field {
            AssumptionField::BaseRevenue => self.base_revenue,
            AssumptionField::EbitdaMargin => self.base_ebitda_margin,
            AssumptionField::RevenueGrowth => self.growth_rate_for_year(0),
            AssumptionField::DaPctOfRevenue => self.da_pct_of_revenue,
            AssumptionField::CapexPctOfRevenue => self.capex_pct_of_revenue,
            AssumptionField::NwcPctOfRevenueDelta => self.nwc_pct_of_revenue_delta,
            AssumptionField::TaxRate => self.tax_rate,
            AssumptionField::DiscountRate => self.discount_rate,
            AssumptionField::TerminalGrowthRate => match self.terminal {
                TerminalAssumption::PerpetuityGrowth { rate } => rate,
                TerminalAssumption::ExitMultiple { .. } => {
                    return Err(MedispaValuationError::InvalidAssumption {
                        field: field.to_string(),
                        reason: "Terminal method is exit-multiple; no growth rate present".into(),
                    });
                }
            },
            AssumptionField::ExitMultiple => match self.terminal {
                TerminalAssumption::ExitMultiple { multiple } => multiple,
                TerminalAssumption::PerpetuityGrowth { .. } => {
                    return Err(MedispaValuationError::InvalidAssumption {
                        field: field.to_string(),
                        reason: "Terminal method is perpetuity-growth; no multiple present".into(),
                    });
                }
            },
            AssumptionField::NetDebt => self.net_debt,
            AssumptionField::NonOperatingAssets => self.non_operating_assets,
        };
        Ok(value)
    }
}

/// Every scalar assumption an analysis layer may perturb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionField {
    BaseRevenue,
    EbitdaMargin,
    /// Sets a single constant growth rate for the whole horizon
    RevenueGrowth,
    DaPctOfRevenue,
    CapexPctOfRevenue,
    NwcPctOfRevenueDelta,
    TaxRate,
    DiscountRate,
    TerminalGrowthRate,
    ExitMultiple,
    NetDebt,
    NonOperatingAssets,
}

impl std::fmt::Display for AssumptionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssumptionField::BaseRevenue => "base_revenue",
            AssumptionField::EbitdaMargin => "ebitda_margin",
            AssumptionField::RevenueGrowth => "revenue_growth",
            AssumptionField::DaPctOfRevenue => "da_pct_of_revenue",
            AssumptionField::CapexPctOfRevenue => "capex_pct_of_revenue",
            AssumptionField::NwcPctOfRevenueDelta => "nwc_pct_of_revenue_delta",
            AssumptionField::TaxRate => "tax_rate",
            AssumptionField::DiscountRate => "discount_rate",
            AssumptionField::TerminalGrowthRate => "terminal_growth_rate",
            AssumptionField::ExitMultiple => "exit_multiple",
            AssumptionField::NetDebt => "net_debt",
            AssumptionField::NonOperatingAssets => "non_operating_assets",
        };
        write!(f, "{name}")
    }
}
