mod engine;
mod error;
mod runner;
mod types;

pub use engine::{project, step};
pub use error::SimulationError;
pub use runner::{DEFAULT_TICK_PERIOD, Simulation};
pub use types::{
    Debt, Projection, SimulationParameters, SimulationSample, SimulationState, round_cents,
};
