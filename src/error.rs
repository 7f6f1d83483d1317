use thiserror::Error;

/// Failure modes of a correction run.
///
/// Parameter problems are always reported before any numerical work starts, so a caller never
/// receives a partially corrected series.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is outside its admissible range, or values are combined in a way the
    /// thermal model does not define (e.g. `tau2` without `tau1`).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The series is too short for the selected derivative method.
    #[error("insufficient data: {required} samples required, {actual} provided")]
    InsufficientData { required: usize, actual: usize },

    /// A sample is non-finite, or the time axis is not strictly increasing.
    #[error("invalid input at index {index} (t = {time}): {reason}")]
    InvalidInput {
        index: usize,
        time: f64,
        reason: String,
    },

    /// The search for a smoothing penalty matching a residual bound did not converge.
    #[error("smoothing parameter search failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<argmin::core::Error> for Error {
    fn from(value: argmin::core::Error) -> Self {
        Self::Solver(value.to_string())
    }
}
