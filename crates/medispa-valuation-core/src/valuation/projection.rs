use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProjectionPeriod, Rate};
use crate::MedispaValuationResult;

use super::assumptions::ValuationAssumptions;

/// One forecast year of the operating model.
///
/// Produced once per run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearProjection {
    pub period: ProjectionPeriod,
    pub revenue: Money,
    pub ebitda: Money,
    pub depreciation: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub capex: Money,
    pub nwc_change: Money,
    pub free_cash_flow: Money,
}

/// Build the ordered yearly series for years 1..=forecast_years.
///
/// Assumptions must already be validated; this only runs the arithmetic.
pub fn build_projections(
    assumptions: &ValuationAssumptions,
) -> MedispaValuationResult<Vec<YearProjection>> {
    let n_years = assumptions.forecast_years;
    let mut projections = Vec::with_capacity(n_years as usize);
    let mut prev_revenue = assumptions.base_revenue;

    for year_idx in 0..n_years {
        let year_num = year_idx + 1;
        let growth: Rate = assumptions.growth_rate_for_year(year_idx);
        let revenue = prev_revenue * (Decimal::ONE + growth);

        let margin = assumptions.margin_for_year(year_num);
        let ebitda = revenue * margin;
        let depreciation = revenue * assumptions.da_pct_of_revenue;
        let ebit = ebitda - depreciation;
        let nopat = ebit * (Decimal::ONE - assumptions.tax_rate);

        let capex = revenue * assumptions.capex_pct_of_revenue;

        // Only incremental revenue consumes working capital; a shrinking
        // year releases nothing.
        let revenue_delta = revenue - prev_revenue;
        let nwc_change = if revenue_delta > Decimal::ZERO {
            revenue_delta * assumptions.nwc_pct_of_revenue_delta
        } else {
            Decimal::ZERO
        };

        let free_cash_flow = nopat + depreciation - capex - nwc_change;

        projections.push(YearProjection {
            period: ProjectionPeriod {
                year: year_num as i32,
                label: format!("Year {year_num}"),
            },
            revenue,
            ebitda,
            depreciation,
            ebit,
            nopat,
            capex,
            nwc_change,
            free_cash_flow,
        });

        prev_revenue = revenue;
    }

    Ok(projections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::assumptions::TerminalAssumption;
    use rust_decimal_macros::dec;

    fn clinic_assumptions() -> ValuationAssumptions {
        ValuationAssumptions {
            base_revenue: dec!(1000),
            base_ebitda_margin: dec!(0.25),
            target_ebitda_margin: None,
            revenue_growth_rates: vec![dec!(0.10)],
            da_pct_of_revenue: dec!(0.03),
            capex_pct_of_revenue: dec!(0.05),
            nwc_pct_of_revenue_delta: dec!(0.10),
            tax_rate: dec!(0.25),
            discount_rate: dec!(0.10),
            terminal: TerminalAssumption::ExitMultiple { multiple: dec!(8) },
            forecast_years: 5,
            net_debt: Decimal::ZERO,
            non_operating_assets: Decimal::ZERO,
        }
    }

    #[test]
    fn test_year1_line_items() {
        let projections = build_projections(&clinic_assumptions()).unwrap();
        let y1 = &projections[0];

        // Revenue = 1000 * 1.10 = 1100
        assert_eq!(y1.revenue, dec!(1100));
        // EBITDA = 1100 * 0.25 = 275
        assert_eq!(y1.ebitda, dec!(275));
        // Depreciation = 1100 * 0.03 = 33
        assert_eq!(y1.depreciation, dec!(33));
        // EBIT = 275 - 33 = 242
        assert_eq!(y1.ebit, dec!(242));
        // NOPAT = 242 * 0.75 = 181.5
        assert_eq!(y1.nopat, dec!(181.5));
        // Capex = 1100 * 0.05 = 55
        assert_eq!(y1.capex, dec!(55));
        // NWC change = 0.10 * (1100 - 1000) = 10
        assert_eq!(y1.nwc_change, dec!(10));
        // FCF = 181.5 + 33 - 55 - 10 = 149.5
        assert_eq!(y1.free_cash_flow, dec!(149.5));
    }

    #[test]
    fn test_horizon_length() {
        let projections = build_projections(&clinic_assumptions()).unwrap();
        assert_eq!(projections.len(), 5);
        assert_eq!(projections[4].period.year, 5);
    }

    #[test]
    fn test_revenue_compounds() {
        let projections = build_projections(&clinic_assumptions()).unwrap();
        let y2 = &projections[1];
        assert_eq!(y2.revenue, dec!(1210));
    }

    #[test]
    fn test_shrinking_revenue_releases_no_working_capital() {
        let mut a = clinic_assumptions();
        a.revenue_growth_rates = vec![dec!(-0.10)];
        let projections = build_projections(&a).unwrap();
        for p in &projections {
            assert_eq!(p.nwc_change, Decimal::ZERO);
        }
    }

    #[test]
    fn test_margin_drift_applied_per_year() {
        let mut a = clinic_assumptions();
        a.target_ebitda_margin = Some(dec!(0.30));
        let projections = build_projections(&a).unwrap();

        // Final-year margin equals the target
        let last = projections.last().unwrap();
        assert_eq!(last.ebitda, last.revenue * dec!(0.30));

        // Margins increase monotonically toward the target
        for w in projections.windows(2) {
            let m0 = w[0].ebitda / w[0].revenue;
            let m1 = w[1].ebitda / w[1].revenue;
            assert!(m1 > m0);
        }
    }

    #[test]
    fn test_flat_growth_means_flat_fcf() {
        let mut a = clinic_assumptions();
        a.revenue_growth_rates = vec![Decimal::ZERO];
        let projections = build_projections(&a).unwrap();
        let first = projections.first().unwrap().free_cash_flow;
        for p in &projections {
            assert_eq!(p.free_cash_flow, first);
        }
    }
}
