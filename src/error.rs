use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the solver, the worker pool and configuration loading.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid construction or configuration parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A particle handle that does not refer to a live particle.
    #[error("unknown particle index {index} (population {len})")]
    UnknownParticle { index: usize, len: usize },

    /// One or more tasks in the last drained batch panicked.
    #[error("{count} task(s) panicked; first: {message}")]
    TaskPanicked { count: usize, message: String },

    /// Work was submitted to a pool that has already been shut down.
    #[error("task scheduler has been shut down")]
    SchedulerShutDown,

    /// The particle store is still referenced by queued or running work.
    #[error("particles are in use by an in-flight tick")]
    TickInFlight,

    /// The background loop thread failed or could not hand the solver back.
    #[error("background loop: {0}")]
    BackgroundLoop(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParam(msg.into())
    }
}
