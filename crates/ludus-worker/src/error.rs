use ludus_kernel::{LudusError, RulesError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The rules engine could not produce the next frame.
    #[error("tick failed: {0}")]
    Tick(#[source] RulesError),

    /// A controller call failed; during a run this is usually a lost lease.
    #[error(transparent)]
    Controller(#[from] LudusError),
}

impl WorkerError {
    pub fn as_controller(&self) -> Option<&LudusError> {
        match self {
            WorkerError::Controller(e) => Some(e),
            WorkerError::Tick(_) => None,
        }
    }
}
