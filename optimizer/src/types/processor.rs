use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Stable identity of every worker, stored in `processor_tracking.processor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessorId {
    BinaryDataProcessor,
    DeviceProcessor,
    DiagnosticProcessor,
    DriverChangeProcessor,
    FaultDataProcessor,
    LogRecordProcessor,
    StatusDataProcessor,
    UserProcessor,
    FaultDataOptimizer,
    StatusDataOptimizer,
    Orchestrator,
}

impl ProcessorId {
    pub const ALL: [ProcessorId; 11] = [
        ProcessorId::BinaryDataProcessor,
        ProcessorId::DeviceProcessor,
        ProcessorId::DiagnosticProcessor,
        ProcessorId::DriverChangeProcessor,
        ProcessorId::FaultDataProcessor,
        ProcessorId::LogRecordProcessor,
        ProcessorId::StatusDataProcessor,
        ProcessorId::UserProcessor,
        ProcessorId::FaultDataOptimizer,
        ProcessorId::StatusDataOptimizer,
        ProcessorId::Orchestrator,
    ];

    pub const fn as_static_str(&self) -> &'static str {
        match self {
            ProcessorId::BinaryDataProcessor => "BinaryDataProcessor",
            ProcessorId::DeviceProcessor => "DeviceProcessor",
            ProcessorId::DiagnosticProcessor => "DiagnosticProcessor",
            ProcessorId::DriverChangeProcessor => "DriverChangeProcessor",
            ProcessorId::FaultDataProcessor => "FaultDataProcessor",
            ProcessorId::LogRecordProcessor => "LogRecordProcessor",
            ProcessorId::StatusDataProcessor => "StatusDataProcessor",
            ProcessorId::UserProcessor => "UserProcessor",
            ProcessorId::FaultDataOptimizer => "FaultDataOptimizer",
            ProcessorId::StatusDataOptimizer => "StatusDataOptimizer",
            ProcessorId::Orchestrator => "Orchestrator",
        }
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown processor identity '{0}'")]
pub struct UnknownProcessorId(pub String);

impl FromStr for ProcessorId {
    type Err = UnknownProcessorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessorId::ALL
            .into_iter()
            .find(|id| id.as_static_str() == s)
            .ok_or_else(|| UnknownProcessorId(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_round_trip_through_their_names() {
        for id in ProcessorId::ALL {
            assert_eq!(id.as_static_str().parse::<ProcessorId>().unwrap(), id);
        }

        assert!("SomethingElse".parse::<ProcessorId>().is_err());
    }
}
