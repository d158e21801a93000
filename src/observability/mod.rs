//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed event names
//! - Lifecycle scopes
//!
//! Observability is read-only: nothing here changes what the engine
//! computes, and a failed log write is ignored.
//!
//! # Usage
//!
//! ```ignore
//! use pagediff::observability::{log_event, Event, ObservationScope};
//!
//! log_event(Event::PageReconciled, &[("page_id", "open"), ("changes", "3")]);
//!
//! let scope = ObservationScope::new(Event::ChangeDetection);
//! // ... do work ...
//! scope.complete(&[]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

/// Logs an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
