//! # Event families.
//!
//! [`EventKind`] identifies where an event came from. The kind name is what
//! appears in log lines (`(DatabaseLogEvent ERROR): ...`), so tests and humans
//! can grep for it.
//!
//! Two groups get special treatment:
//! - **loader** kinds (stress tools): a critical loader event is reported as
//!   a failed stress command when the test is killed;
//! - **system** kinds: recorded in the raw log but never fanned out.

use std::fmt;

use super::Severity;

/// Classification of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Database node ===
    /// A database log line matched a known pattern.
    DatabaseLog,
    /// A core dump was found on a node.
    CoreDump,

    // === Loaders ===
    CassandraStress,
    ScyllaBench,
    YcsbStress,
    NdbenchStress,
    CdcReaderStress,
    Gemini,

    // === Test flow ===
    /// A disruptive operation (nemesis) started or finished.
    Disruption,
    /// An error inside the harness itself.
    TestFramework,
    /// Terminal report of the whole run.
    TestResult,
    /// A worker thread or task died with an error.
    ThreadFailed,
    /// Free-form informational message.
    Info,

    // === Infrastructure and validation ===
    SpotTermination,
    ClusterHealth,
    DataValidator,
    PrometheusAlert,

    // === System ===
    /// Probe published at bus start to check the loop delivers.
    StartupTest,
}

impl EventKind {
    /// Name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DatabaseLog => "DatabaseLogEvent",
            EventKind::CoreDump => "CoreDumpEvent",
            EventKind::CassandraStress => "CassandraStressEvent",
            EventKind::ScyllaBench => "ScyllaBenchEvent",
            EventKind::YcsbStress => "YcsbStressEvent",
            EventKind::NdbenchStress => "NdbenchStressEvent",
            EventKind::CdcReaderStress => "CDCReaderStressEvent",
            EventKind::Gemini => "GeminiEvent",
            EventKind::Disruption => "DisruptionEvent",
            EventKind::TestFramework => "TestFrameworkEvent",
            EventKind::TestResult => "TestResultEvent",
            EventKind::ThreadFailed => "ThreadFailedEvent",
            EventKind::Info => "InfoEvent",
            EventKind::SpotTermination => "SpotTerminationEvent",
            EventKind::ClusterHealth => "ClusterHealthValidatorEvent",
            EventKind::DataValidator => "DataValidatorEvent",
            EventKind::PrometheusAlert => "PrometheusAlertManagerEvent",
            EventKind::StartupTest => "StartupTestEvent",
        }
    }

    /// Severity a freshly built event of this kind starts with.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventKind::SpotTermination => Severity::Critical,
            EventKind::CoreDump
            | EventKind::TestFramework
            | EventKind::ThreadFailed
            | EventKind::ClusterHealth
            | EventKind::DataValidator => Severity::Error,
            EventKind::PrometheusAlert => Severity::Warning,
            _ => Severity::Normal,
        }
    }

    /// True for stress-tool events.
    #[inline]
    pub fn is_loader(&self) -> bool {
        matches!(
            self,
            EventKind::CassandraStress
                | EventKind::ScyllaBench
                | EventKind::YcsbStress
                | EventKind::NdbenchStress
                | EventKind::CdcReaderStress
        )
    }

    /// True for bus-internal events that subscribers never see.
    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self, EventKind::StartupTest)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
