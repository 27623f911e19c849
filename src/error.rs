use std::fmt;

/// Result type for gymkit operations
pub type Result<T> = std::result::Result<T, GymkitError>;

/// Main error type for the gymkit library
#[derive(Debug, Clone, PartialEq)]
pub enum GymkitError {
    /// A memory was asked for more samples than it holds
    NotEnoughData {
        requested: usize,
        available: usize,
    },

    /// Tensor shapes disagree
    ShapeMismatch {
        expected: String,
        actual: String,
    },

    /// Binner input outside of `[low, high]`
    OutOfBounds {
        dim: usize,
        value: f32,
        low: f32,
        high: f32,
    },

    /// Q table access with an action index beyond the action space
    ActionOutOfRange {
        action: usize,
        n_actions: usize,
    },

    /// Tracker value registered twice
    DuplicateName(String),

    /// Scalar-only operation on a node-backed tracked value
    NotScalarTracked(String),

    /// Tracker value was never registered
    UnknownName(String),

    /// Environment RPC failure
    Network(String),

    /// Local environment server could not be brought up
    Container(String),

    /// Unknown or unsupported space variant
    Unsupported(String),

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    Io(String),

    /// Serialization/deserialization errors
    Serialization(String),

    /// A parallel worker failed or disconnected
    Worker(String),
}

impl fmt::Display for GymkitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GymkitError::NotEnoughData { requested, available } => {
                write!(f, "Not enough data: requested {}, only {} available", requested, available)
            }
            GymkitError::ShapeMismatch { expected, actual } => {
                write!(f, "Shape mismatch: expected {}, got {}", expected, actual)
            }
            GymkitError::OutOfBounds { dim, value, low, high } => {
                write!(f, "Value {} in dimension {} is outside of [{}, {}]", value, dim, low, high)
            }
            GymkitError::ActionOutOfRange { action, n_actions } => {
                write!(f, "Invalid action {}: must be less than {}", action, n_actions)
            }
            GymkitError::DuplicateName(name) => write!(f, "Value '{}' is already tracked", name),
            GymkitError::NotScalarTracked(name) => {
                write!(f, "Value '{}' is node-backed and cannot be mutated as a scalar", name)
            }
            GymkitError::UnknownName(name) => write!(f, "Value '{}' is not tracked", name),
            GymkitError::Network(msg) => write!(f, "Network error: {}", msg),
            GymkitError::Container(msg) => write!(f, "Container error: {}", msg),
            GymkitError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            GymkitError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            GymkitError::Io(msg) => write!(f, "IO error: {}", msg),
            GymkitError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            GymkitError::Worker(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl std::error::Error for GymkitError {}

impl From<std::io::Error> for GymkitError {
    fn from(err: std::io::Error) -> Self {
        GymkitError::Io(err.to_string())
    }
}

impl From<bincode::Error> for GymkitError {
    fn from(err: bincode::Error) -> Self {
        GymkitError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GymkitError {
    fn from(err: serde_json::Error) -> Self {
        GymkitError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GymkitError {
    fn from(err: reqwest::Error) -> Self {
        GymkitError::Network(err.to_string())
    }
}

impl From<ndarray::ShapeError> for GymkitError {
    fn from(err: ndarray::ShapeError) -> Self {
        GymkitError::ShapeMismatch {
            expected: "compatible shape".to_string(),
            actual: err.to_string(),
        }
    }
}

// Helper functions for common error patterns
impl GymkitError {
    pub fn shape_mismatch<E: fmt::Debug, A: fmt::Debug>(expected: E, actual: A) -> Self {
        GymkitError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    pub fn invalid_parameter<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        GymkitError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
