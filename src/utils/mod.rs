//! Input parsing helpers for the command line

pub mod duration;
pub mod port_spec;

pub use duration::parse_duration;
pub use port_spec::PortSpec;

use crate::ScanError;

/// Reject blank targets before any network work starts
pub fn validate_target(target: &str) -> crate::Result<&str> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ScanError::InvalidTarget("host is required".to_string()));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(ScanError::InvalidTarget(format!(
            "host '{}' contains whitespace",
            target
        )));
    }
    Ok(target)
}
