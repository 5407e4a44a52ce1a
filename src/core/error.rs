use thiserror::Error;
use tokio::runtime::TryCurrentError;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("a Tokio runtime is required to schedule simulation ticks: {0}")]
    NoRuntime(#[from] TryCurrentError),
}
