pub mod scenario;
pub mod sensitivity;
pub mod tornado;

pub use scenario::{analyze_scenarios, Scenario, ScenarioOutput};
pub use sensitivity::{run_sensitivity, SensitivityAxis, SensitivityGrid};
pub use tornado::{run_tornado, TornadoDriver, TornadoOutput};
