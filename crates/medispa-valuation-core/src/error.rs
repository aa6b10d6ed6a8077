use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MedispaValuationError {
    #[error("Invalid assumption: {field} — {reason}")]
    InvalidAssumption { field: String, reason: String },

    #[error("Invalid terminal assumption: {0}")]
    InvalidTerminalAssumption(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Invalid distribution for {parameter}: {reason}")]
    DistributionSampling { parameter: String, reason: String },

    #[error(
        "Sensitivity grid failed at {parameter_a}={value_a}, {parameter_b}={value_b}: {source}"
    )]
    GridEvaluation {
        parameter_a: String,
        value_a: Decimal,
        parameter_b: String,
        value_b: Decimal,
        #[source]
        source: Box<MedispaValuationError>,
    },

    #[error("Tornado shock failed at {parameter}={value}: {source}")]
    DriverEvaluation {
        parameter: String,
        value: Decimal,
        #[source]
        source: Box<MedispaValuationError>,
    },

    #[error("Monte Carlo iteration {iteration} failed: {source}")]
    Simulation {
        iteration: u32,
        #[source]
        source: Box<MedispaValuationError>,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for MedispaValuationError {
    fn from(e: serde_json::Error) -> Self {
        MedispaValuationError::SerializationError(e.to_string())
    }
}
