//! Threshold evaluation

use super::types::AlertSeverity;
use crate::config_store::ThresholdPair;

/// Severity for a percentage reading.
///
/// Below warning: no alert. At or above critical: critical. Otherwise warning.
pub fn threshold_severity(value: f64, pair: ThresholdPair) -> Option<AlertSeverity> {
    if value.is_nan() || value < pair.warning {
        None
    } else if value >= pair.critical {
        Some(AlertSeverity::Critical)
    } else {
        Some(AlertSeverity::Warning)
    }
}
