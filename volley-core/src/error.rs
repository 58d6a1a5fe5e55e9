pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scenario `{0}` not found and no `default` scenario is defined")]
    ScenarioNotFound(String),

    #[error("`api.baseUrl` is required")]
    MissingBaseUrl,

    #[error("invalid `api.baseUrl`: {0}")]
    InvalidBaseUrl(String),

    #[error("`auth.tokenUrl` is required when authentication is enabled")]
    MissingTokenUrl,

    #[error(
        "invalid `executor` `{0}` (expected `constant-arrival-rate`, `staged`, or `fixed`)"
    )]
    InvalidExecutor(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`rate` must be a positive integer")]
    InvalidRate,

    #[error("`rate` and `duration` are required for `constant-arrival-rate`")]
    MissingArrivalRateFields,

    #[error("`--rate` only applies to `constant-arrival-rate` scenarios")]
    RateOverrideNotApplicable,

    #[error("`timeUnit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`preAllocatedVUs` must be a positive integer")]
    InvalidPreAllocatedVus,

    #[error("`maxVUs` must be >= `preAllocatedVUs`")]
    InvalidMaxVus,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("invalid `interpolation` `{0}` (expected `linear` or `step`)")]
    InvalidInterpolation(String),

    #[error("invalid `method` `{0}` (expected `GET`, `POST`, or `MIXED`)")]
    InvalidMethod(String),

    #[error("`MIXED` requires a non-empty `endpoints` array")]
    MissingEndpoints,

    #[error("endpoint weight must be a finite, non-negative number (got {0})")]
    InvalidWeight(f64),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error(transparent)]
    Threshold(#[from] crate::thresholds_eval::Error),

    #[error("authentication failed during setup: {0}")]
    Setup(#[from] crate::token::AuthError),

    #[error("http client setup failed: {0}")]
    Client(#[from] volley_http::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Errors raised while resolving configuration, before any request is sent.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::Setup(_) | Self::Client(_) | Self::Join(_))
    }
}

/// A scheduled iteration start that no worker could take.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{count} iteration start(s) dropped: all {max_vus} VUs busy or backlogged")]
pub struct DroppedIterationError {
    pub count: u64,
    pub max_vus: u64,
}
