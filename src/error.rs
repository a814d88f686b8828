//! Error handling for the netscan scanner
//!
//! Probe failures are never errors: the engine reports them as outcomes.
//! This type covers what can go wrong at the boundary, before the engine
//! is invoked (bad input, bad configuration, local I/O).

use thiserror::Error;

/// Main error type for boundary operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Port range error: {0}")]
    PortRangeError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScanError {
    /// Whether the error was caused by user input rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_) | ScanError::PortRangeError(_) | ScanError::ParseError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::PortRangeError("start port cannot be greater than end port".to_string());
        assert_eq!(
            err.to_string(),
            "Port range error: start port cannot be greater than end port"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ScanError = io.into();
        assert!(matches!(err, ScanError::IoError(_)));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_input_error_classification() {
        assert!(ScanError::InvalidTarget(String::new()).is_input_error());
        assert!(ScanError::ParseError(String::new()).is_input_error());
        assert!(!ScanError::ConfigError(String::new()).is_input_error());
    }
}
