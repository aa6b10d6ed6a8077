pub mod assumptions;
pub mod dcf;
pub mod multiples;
pub mod projection;
pub mod terminal;
pub mod wacc;

pub use assumptions::{AssumptionField, TerminalAssumption, ValuationAssumptions};
pub use dcf::{valuate, ValuationResult};
pub use multiples::{valuate_blended, valuate_by_multiple, MarketFactors};
pub use projection::YearProjection;
