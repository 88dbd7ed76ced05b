//! Detection of unsafe redeployments.
//!
//! Tracking records remember which version of the optimizer ran on which host. Starting on
//! another host, or starting an older version than the one that last wrote the records, usually
//! means two deployments compete for the same databases. Both are refused unless allowed.

use std::cmp::Ordering;

use config::shared::EnvironmentValidationConfig;
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, OptimizerResult};
use crate::tracker::ProcessorTrackingRecord;

/// Version and host of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub version: String,
    pub machine_name: String,
}

impl EnvironmentInfo {
    pub fn new(version: impl Into<String>, machine_name: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            machine_name: machine_name.into(),
        }
    }
}

/// Compares dotted numeric versions segment by segment. Missing segments count as 0 and the
/// numeric prefix of each segment is used, so `1.2.0-rc1` equals `1.2`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = version_segments(left);
    let right = version_segments(right);
    let len = left.len().max(right.len());

    (0..len)
        .map(|index| {
            let l = left.get(index).copied().unwrap_or(0);
            let r = right.get(index).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn version_segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|segment| {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Checks every tracking record against the running environment.
///
/// Violations that the configuration allows are logged and accepted.
pub fn validate_environment(
    records: &[ProcessorTrackingRecord],
    current: &EnvironmentInfo,
    config: &EnvironmentValidationConfig,
) -> OptimizerResult<()> {
    let mut violations = Vec::new();

    for record in records {
        if let Some(machine_name) = record.optimizer_machine_name.as_deref() {
            if machine_name != current.machine_name {
                if config.allow_machine_name_change {
                    warn!(
                        processor = %record.processor,
                        recorded = machine_name,
                        current = %current.machine_name,
                        "machine name changed, accepted by configuration"
                    );
                } else {
                    violations.push(format!(
                        "{} last ran on '{}', this host is '{}'",
                        record.processor, machine_name, current.machine_name
                    ));
                }
            }
        }

        if let Some(version) = record.optimizer_version.as_deref() {
            if compare_versions(version, &current.version) == Ordering::Greater {
                if config.allow_version_downgrade {
                    warn!(
                        processor = %record.processor,
                        recorded = version,
                        current = %current.version,
                        "version downgrade, accepted by configuration"
                    );
                } else {
                    violations.push(format!(
                        "{} last ran with version {}, this is version {}",
                        record.processor, version, current.version
                    ));
                }
            }
        }
    }

    if !violations.is_empty() {
        bail!(
            ErrorKind::EnvironmentValidationFailed,
            "The tracking records were written by another deployment",
            violations.join("; ")
        );
    }

    Ok(())
}
