use std::fmt;

/// Result type for Hermes operations
pub type Result<T> = std::result::Result<T, HermesError>;

/// Main error type for the Hermes learning core
#[derive(Debug, Clone)]
pub enum HermesError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Empty buffer or container
    EmptyBuffer(String),

    /// A layer named for sharing has no counterpart in the other instance
    LayerMismatch {
        layer: String,
        reason: String,
    },

    /// No complete snapshot could be found for a prefix
    SnapshotNotFound(String),

    /// A teammate left the exchange round before completing it
    TeammateAborted {
        agent: usize,
        round: u64,
    },

    /// Every teammate holding a channel end has gone away
    Disconnected(String),

    /// Waiting on a teammate exceeded the configured receive timeout
    Timeout {
        round: u64,
        phase: String,
    },

    /// Teammates disagree about the shape of the exchanged data
    ProtocolViolation(String),
}

impl fmt::Display for HermesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HermesError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            HermesError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            HermesError::IoError(msg) => write!(f, "IO error: {}", msg),
            HermesError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            HermesError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            HermesError::LayerMismatch { layer, reason } => {
                write!(f, "Cannot share layer '{}': {}", layer, reason)
            }
            HermesError::SnapshotNotFound(prefix) => {
                write!(f, "No complete snapshot found for prefix '{}'", prefix)
            }
            HermesError::TeammateAborted { agent, round } => {
                write!(f, "Agent {} aborted exchange round {}", agent, round)
            }
            HermesError::Disconnected(msg) => write!(f, "Exchange disconnected: {}", msg),
            HermesError::Timeout { round, phase } => {
                write!(f, "Timed out waiting for teammates in round {} ({})", round, phase)
            }
            HermesError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for HermesError {}

impl From<std::io::Error> for HermesError {
    fn from(err: std::io::Error) -> Self {
        HermesError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for HermesError {
    fn from(err: bincode::Error) -> Self {
        HermesError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HermesError {
    fn from(err: ndarray::ShapeError) -> Self {
        HermesError::DimensionMismatch {
            expected: "compatible array shapes".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HermesError {
    fn from(err: serde_json::Error) -> Self {
        HermesError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl HermesError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        HermesError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        HermesError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn layer_mismatch<S: Into<String>>(layer: S, reason: S) -> Self {
        HermesError::LayerMismatch {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}
