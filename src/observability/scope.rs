//! ObservationScope for begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when told the outcome
//! - Logs `{name}_INCOMPLETE` on drop without an outcome
//!
//! Scopes are `Send` and may be held across `.await` points; a scope
//! dropped because its future was cancelled reports `_INCOMPLETE`.

use std::time::Instant;

use super::events::Event;
use super::logger::Logger;

/// A scope that logs its lifecycle
pub struct ObservationScope {
    name: &'static str,
    completed: bool,
    fields: Vec<(&'static str, String)>,
    timer: Timer,
}

impl ObservationScope {
    /// Logs `{name}_BEGIN` immediately.
    pub fn new(event: Event) -> Self {
        Self::with_fields(event, Vec::new())
    }

    /// Like [`ObservationScope::new`], repeating `fields` on every line
    pub fn with_fields(event: Event, fields: Vec<(&'static str, String)>) -> Self {
        let scope = Self {
            name: event.as_str(),
            completed: false,
            fields,
            timer: Timer::new(),
        };
        scope.emit("BEGIN", &[], Logger::info);
        scope
    }

    /// Logs `{name}_COMPLETE` with the elapsed time and `extra` fields.
    pub fn complete(mut self, extra: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.timer.elapsed_ms();
        let mut fields = extra.to_vec();
        fields.push(("elapsed_ms", elapsed.as_str()));
        self.emit("COMPLETE", &fields, Logger::info);
    }

    /// Logs `{name}_FAILED` at ERROR level.
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        self.emit("FAILED", &[("reason", reason)], Logger::error);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn emit(&self, suffix: &str, extra: &[(&str, &str)], log: fn(&str, &[(&str, &str)])) {
        let event = format!("{}_{}", self.name, suffix);
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend_from_slice(extra);
        log(&event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            self.emit(
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
                Logger::warn,
            );
        }
    }
}

/// A simple duration timer
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
