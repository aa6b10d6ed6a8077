pub mod simulation;

pub use simulation::{
    run_monte_carlo, Distribution, McVariable, MonteCarloInput, MonteCarloRun,
};
