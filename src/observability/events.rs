//! Observable events
//!
//! Every log event the crate emits is named here.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Scopes (logged with _BEGIN / _COMPLETE / _FAILED suffixes)
    /// One change detection call
    ChangeDetection,
    /// One page snapshot read
    PageSnapshot,

    // Staging
    /// Staging area written
    StagingAcquired,
    /// Staging area dropped
    StagingReleased,
    /// Dropping a staging area failed
    StagingCleanupFailed,
    /// Staging handle dropped outside a runtime
    StagingLeaked,

    // Fallbacks
    /// Current versions of updated records could not be read
    UpdateLookupFailed,
    /// Last known values of deletion markers could not be read
    MarkerLookupFailed,
    /// The page-shrink look-ahead query failed
    LookaheadFailed,

    // Reconciliation
    /// Page pipeline compiled
    PipelineCompiled,
    /// One page reconciled
    PageReconciled,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ChangeDetection => "CHANGE_DETECTION",
            Event::PageSnapshot => "PAGE_SNAPSHOT",
            Event::StagingAcquired => "STAGING_ACQUIRED",
            Event::StagingReleased => "STAGING_RELEASED",
            Event::StagingCleanupFailed => "STAGING_CLEANUP_FAILED",
            Event::StagingLeaked => "STAGING_LEAKED",
            Event::UpdateLookupFailed => "UPDATE_LOOKUP_FAILED",
            Event::MarkerLookupFailed => "MARKER_LOOKUP_FAILED",
            Event::LookaheadFailed => "LOOKAHEAD_FAILED",
            Event::PipelineCompiled => "PIPELINE_COMPILED",
            Event::PageReconciled => "PAGE_RECONCILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StagingCleanupFailed
            | Event::StagingLeaked
            | Event::UpdateLookupFailed
            | Event::MarkerLookupFailed
            | Event::LookaheadFailed => Severity::Warn,
            Event::PipelineCompiled => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
