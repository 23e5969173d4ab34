//! Unified event logging for the optimization pipeline.
//!
//! This module provides an append-only event log that captures the activity
//! of the redundancy elimination pipeline, from individual saves and reloads
//! to per-candidate decisions such as applying a min cut or retrying after a
//! critical edge. Events can be inspected for debugging or safely ignored.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Lock-free collection of events with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! The log is backed by `boxcar::Vec`, so passes running on different
//! functions in parallel append to one shared log without locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use ssapre::compiler::{EventLog, EventKind, FunctionId};
//!
//! let log = EventLog::new();
//!
//! log.record(EventKind::ComputationInserted)
//!     .at(FunctionId::new(0), 3)
//!     .message("add loc0, arg1 at end of B3");
//!
//! log.info("Starting pass: ssapre");
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use strum::{EnumCount, EnumIter};

use crate::compiler::FunctionId;

/// Kinds of events recorded during optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum EventKind {
    // Transformations
    /// A computation's value was copied into a temporary.
    ExpressionSaved,
    /// A computation was replaced by a read of a temporary.
    ExpressionReloaded,
    /// A computation was inserted at the end of a predecessor block.
    ComputationInserted,
    /// A phi node merging temporaries was created.
    TemporaryPhiInserted,
    /// A redundant runtime check was removed.
    StatementRemoved,
    /// A computation was placed at a control-dependence point.
    ExpressionHoisted,

    // Analysis
    /// A candidate finished processing.
    CandidateProcessed,
    /// Profile-driven speculation chose insertion points by min cut.
    MinCutApplied,
    /// A candidate was recomputed after an insertion hit a critical edge.
    CriticalEdgeRetry,

    // Engine
    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,
    /// Processing of a function started.
    FunctionProcessingStarted,
    /// Processing of a function completed.
    FunctionProcessingCompleted,

    // Diagnostic
    /// Informational message.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

impl EventKind {
    /// Returns a short human readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::ExpressionSaved => "expression saved",
            Self::ExpressionReloaded => "expression reloaded",
            Self::ComputationInserted => "computation inserted",
            Self::TemporaryPhiInserted => "temporary phi inserted",
            Self::StatementRemoved => "statement removed",
            Self::ExpressionHoisted => "expression hoisted",
            // Analysis
            Self::CandidateProcessed => "candidate processed",
            Self::MinCutApplied => "min cut applied",
            Self::CriticalEdgeRetry => "critical edge retry",
            // Engine
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::FunctionProcessingStarted => "function processing started",
            Self::FunctionProcessingCompleted => "function processing completed",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns `true` if the event describes a change to the program.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ExpressionSaved
                | Self::ExpressionReloaded
                | Self::ComputationInserted
                | Self::TemporaryPhiInserted
                | Self::StatementRemoved
                | Self::ExpressionHoisted
        )
    }

    /// Returns `true` for info, warning and error events.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The function concerned, if any.
    pub function: Option<FunctionId>,
    /// Block index inside the function, if any.
    pub location: Option<usize>,
    /// Free-form detail.
    pub message: String,
    /// The pass that recorded the event.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Fluent builder for an event. The event is appended when the builder drops.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<FunctionId>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets function and block.
    #[must_use]
    pub fn at(mut self, function: FunctionId, location: usize) -> Self {
        self.function = Some(function);
        self.location = Some(location);
        self
    }

    /// Sets the function.
    #[must_use]
    pub fn function(mut self, function: FunctionId) -> Self {
        self.function = Some(function);
        self
    }

    /// Sets the block.
    #[must_use]
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the message. Defaults to the kind's description.
    #[must_use]
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the recording pass.
    #[must_use]
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Append-only, thread-safe event collection.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Returns the number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Iterates over events concerning `function`.
    pub fn filter_function(&self, function: FunctionId) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter_map(move |(_, e)| {
            if e.function == Some(function) {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Iterates over transformation events.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter_map(|(_, e)| {
            if e.kind.is_transformation() {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Iterates over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Iterates over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Counts events per kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .count()
    }

    /// Returns the number of distinct functions mentioned by events.
    #[must_use]
    pub fn functions_affected(&self) -> usize {
        self.events
            .iter()
            .filter_map(|(_, e)| e.function)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Returns a one-line summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        // Only show transformation counts in summary
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.record(EventKind::ComputationInserted)
            .at(FunctionId::new(1), 3)
            .pass("ssapre")
            .message("inserted");
        log.record(EventKind::ExpressionReloaded);

        assert_eq!(log.len(), 2);
        let first = log.iter().next().unwrap();
        assert_eq!(first.function, Some(FunctionId::new(1)));
        assert_eq!(first.location, Some(3));
        assert_eq!(first.pass.as_deref(), Some("ssapre"));
        let second = log.iter().nth(1).unwrap();
        assert_eq!(second.message, "expression reloaded");
    }

    #[test]
    fn test_counts_and_summary() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.info("starting");
        assert_eq!(log.summary(), "1 events");

        log.record(EventKind::ExpressionSaved);
        log.record(EventKind::ExpressionReloaded);
        log.record(EventKind::ExpressionReloaded);

        assert_eq!(log.count_kind(EventKind::ExpressionReloaded), 2);
        assert_eq!(log.transformation_count(), 3);
        assert_eq!(
            log.summary(),
            "1 expression saved, 2 expression reloaded"
        );
    }

    #[test]
    fn test_filters_and_merge() {
        let log = EventLog::new();
        log.record(EventKind::MinCutApplied).function(FunctionId::new(7));
        log.warn("careful");
        log.error("broken");

        let other = EventLog::new();
        other.merge(&log);
        assert_eq!(other.len(), 3);
        assert_eq!(other.filter_function(FunctionId::new(7)).count(), 1);
        assert_eq!(other.warnings().count(), 1);
        assert_eq!(other.errors().count(), 1);
        assert_eq!(other.functions_affected(), 1);
        assert!(other.has(EventKind::MinCutApplied));
    }

    #[test]
    fn test_kind_classification_is_exhaustive() {
        assert_eq!(EventKind::iter().count(), EventKind::COUNT);
        for kind in EventKind::iter() {
            assert!(!(kind.is_transformation() && kind.is_diagnostic()));
            assert!(!kind.description().is_empty());
        }
    }
}
