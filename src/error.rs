//! Error types for the navigation stack
//!
//! Only I/O-facing operations return these. Parser desync and numeric
//! degeneracy in the estimator are recovered locally and show up in the
//! stats counters instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError{
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The DVL never echoed its `>` prompt after a command
    #[error("DVL command {command:?} not acknowledged within {timeout_ms} ms")]
    CommandTimeout{
        command: String,
        timeout_ms: u64,
    },

    #[error("Matrix is singular at pivot {pivot}")]
    SingularMatrix{
        pivot: usize,
    },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// A serial read hit end of stream
    #[error("Port closed")]
    PortClosed,
}

impl From<toml::de::Error> for NavError{
    fn from(e: toml::de::Error) -> Self{
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_timeout_message(){
        let err = NavError::CommandTimeout{ command: "CS\r".to_string(), timeout_ms: 2000 };
        assert_eq!(err.to_string(), "DVL command \"CS\\r\" not acknowledged within 2000 ms");
    }

    #[test]
    fn test_toml_error_maps_to_config(){
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("this is = = not toml");
        let err: NavError = parsed.unwrap_err().into();
        assert!(matches!(err, NavError::Config(_)));
    }
}
