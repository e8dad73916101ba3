//! Simulation event log
//!
//! Each observable step of a run (arrivals, CPU grants, preemptions,
//! completions, interrupts, failures, restorations) is emitted as a
//! [`SimEvent`] stamped with simulated time and handed to an [`EventSink`].

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use colored::*;
use serde::{Deserialize, Serialize};

use crate::types::{Pid, Priority, SimTime};

/// Why a running process left the CPU before finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptReason {
    /// Round-robin time slice expired
    Quantum,
    /// A more urgent process took the CPU
    Priority,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Arrival {
        pid: Pid,
        demand: SimTime,
        priority: Priority,
    },
    Execute {
        pid: Pid,
        waited: SimTime,
    },
    Resume {
        pid: Pid,
    },
    Preempt {
        pid: Pid,
        remaining: SimTime,
        reason: PreemptReason,
    },
    Complete {
        pid: Pid,
    },
    Interrupt {
        pid: Pid,
    },
    Catastrophe,
    /// Work discarded by a catastrophe
    QueueLost {
        lost: u64,
    },
    Restoration {
        downtime: SimTime,
    },
    Recovery {
        duration: SimTime,
    },
}

impl EventKind {
    /// Short console tag
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Arrival { .. } => "ARRIVAL",
            EventKind::Execute { .. } => "EXECUTE",
            EventKind::Resume { .. } => "RESUME",
            EventKind::Preempt { .. } => "PREEMPT",
            EventKind::Complete { .. } => "COMPLETE",
            EventKind::Interrupt { .. } => "INTERRUPT",
            EventKind::Catastrophe => "CATASTROPHE",
            EventKind::QueueLost { .. } => "LOST",
            EventKind::Restoration { .. } => "RESTORED",
            EventKind::Recovery { .. } => "RECOVERED",
        }
    }

    /// Process the event is about, if any
    pub fn pid(&self) -> Option<Pid> {
        match self {
            EventKind::Arrival { pid, .. }
            | EventKind::Execute { pid, .. }
            | EventKind::Resume { pid }
            | EventKind::Preempt { pid, .. }
            | EventKind::Complete { pid }
            | EventKind::Interrupt { pid } => Some(*pid),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            EventKind::Arrival { pid, demand, priority } => {
                format!("Process {} arrives (burst: {:.2}, prio: {})", pid, demand, priority)
            }
            EventKind::Execute { pid, waited } => {
                format!("Process {} starts (waited: {:.2})", pid, waited)
            }
            EventKind::Resume { pid } => format!("Process {} resumes", pid),
            EventKind::Preempt { pid, remaining, reason } => match reason {
                PreemptReason::Quantum => {
                    format!("Process {} preempted (rem: {:.2})", pid, remaining)
                }
                PreemptReason::Priority => format!(
                    "Process {} preempted by higher priority process (rem: {:.2})",
                    pid, remaining
                ),
            },
            EventKind::Complete { pid } => format!("Process {} finished", pid),
            EventKind::Interrupt { pid } => format!("Process {} interrupted by fault", pid),
            EventKind::Catastrophe => "System failure, all work halted".to_string(),
            EventKind::QueueLost { lost } => {
                format!("{} queued or running processes lost", lost)
            }
            EventKind::Restoration { downtime } => {
                format!("System restored (downtime: {:.2})", downtime)
            }
            EventKind::Recovery { duration } => {
                format!("Backlog drained (recovery: {:.2})", duration)
            }
        }
    }
}

/// A timestamped event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub time: SimTime,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time {:.2}: {:<11} {}",
            self.time,
            format!("[{}]", self.kind.tag()),
            self.kind.describe()
        )
    }
}

/// Destination for simulation events
pub trait EventSink {
    /// Record one event
    fn record(&mut self, event: &SimEvent);

    /// Flush buffered output and report the first write failure, if any
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Human-readable lines on stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        ConsoleSink
    }

    fn paint(kind: &EventKind, tag: String) -> ColoredString {
        match kind {
            EventKind::Arrival { .. } => tag.cyan(),
            EventKind::Execute { .. } | EventKind::Resume { .. } => tag.green(),
            EventKind::Preempt { .. } => tag.yellow(),
            EventKind::Complete { .. } => tag.bright_green(),
            EventKind::Interrupt { .. } | EventKind::QueueLost { .. } => tag.red(),
            EventKind::Catastrophe => tag.bright_red().bold(),
            EventKind::Restoration { .. } | EventKind::Recovery { .. } => tag.bright_blue().bold(),
        }
    }
}

impl EventSink for ConsoleSink {
    fn record(&mut self, event: &SimEvent) {
        let tag = format!("{:<11}", format!("[{}]", event.kind.tag()));
        println!(
            "Time {:.2}: {} {}",
            event.time,
            Self::paint(&event.kind, tag),
            event.kind.describe()
        );
    }
}

/// One JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, error: None }
    }

    fn write_event(&mut self, event: &SimEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn record(&mut self, event: &SimEvent) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.write_event(event) {
            log::warn!("event log write failed, dropping further events: {}", err);
            self.error = Some(err);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()
    }
}

/// In-memory capture; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Rc<RefCell<Vec<SimEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.borrow().clone()
    }

    /// Events whose kind matches `pred`
    pub fn filter(&self, pred: impl Fn(&EventKind) -> bool) -> Vec<SimEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|event| pred(&event.kind))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, event: &SimEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: &SimEvent) {}
}
