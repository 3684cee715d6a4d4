//! Error types shared by every estimator in the crate.

use thiserror::Error;

/// Errors returned by fitting, prediction and the model store.
#[derive(Debug, Error)]
pub enum WoodsError {
    /// Row or column counts disagree (X vs y, or fit-time vs predict-time columns).
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Zero rows passed to fit, or a statistic requested over an empty subset.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Hyperparameters outside their valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `predict` or `save_model` called before a successful `fit`.
    #[error("model is not fitted")]
    NotFitted,

    /// Persistence medium missing or unreadable.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted model does not match the expected schema, version or shape.
    #[error("format error: {0}")]
    Format(String),

    /// A persisted model is not well-formed JSON, or its bincode body is
    /// truncated or undecodable.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for WoodsError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Io => WoodsError::Io(err.into()),
            Category::Syntax | Category::Eof => WoodsError::Parse(err.to_string()),
            Category::Data => WoodsError::Format(err.to_string()),
        }
    }
}

impl From<bincode::Error> for WoodsError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                WoodsError::Parse(format!("truncated bincode data: {io}"))
            }
            bincode::ErrorKind::Io(io) => WoodsError::Io(io),
            bincode::ErrorKind::Custom(msg) => WoodsError::Format(msg),
            other => WoodsError::Parse(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WoodsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_syntax_error_is_parse() {
        let err: WoodsError = serde_json::from_str::<serde_json::Value>("{\"a\": ")
            .unwrap_err()
            .into();
        assert!(matches!(err, WoodsError::Parse(_)));
    }

    #[test]
    fn test_truncated_bincode_is_parse() {
        let bytes = bincode::serialize(&(1u64, 2.5f64)).unwrap();
        let err: WoodsError = bincode::deserialize::<(u64, f64)>(&bytes[..5])
            .unwrap_err()
            .into();
        assert!(matches!(err, WoodsError::Parse(_)));
    }

    #[test]
    fn test_json_data_error_is_format() {
        let err: WoodsError = serde_json::from_str::<u32>("\"not a number\"")
            .unwrap_err()
            .into();
        assert!(matches!(err, WoodsError::Format(_)));
    }
}
