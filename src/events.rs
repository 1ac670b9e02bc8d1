// src/events.rs

//! Job lifecycle events and the queue they are delivered on.
//!
//! Every driver pushes [`Event`]s onto a shared unbounded FIFO channel as it
//! observes its jobs change state. The orchestrator owns the consuming half
//! ([`EventQueue`]) and drains it from a single logical task; the producing
//! half ([`EventSender`]) is cloned freely into the driver's background
//! tasks.

use tokio::sync::mpsc;

/// Canonical realization index type used throughout the crate.
///
/// Supplied by the orchestrator at submit time and echoed back in every
/// event; drivers never generate indices themselves.
pub type JobIndex = u32;

/// A state change observed for one job.
///
/// For a given `iens` the sequence delivered on the queue is a prefix of
/// `Submitted, Started, Finished`: at most one `Finished` is ever emitted
/// and nothing follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The backend accepted the job; it is not running yet.
    Submitted { iens: JobIndex },
    /// The backend confirmed that execution began.
    Started { iens: JobIndex },
    /// Terminal. `aborted` is true when the job was killed or the backend
    /// reported an abnormal returncode; a signal death is encoded as the
    /// negative signal number.
    Finished {
        iens: JobIndex,
        returncode: i32,
        aborted: bool,
    },
}

impl Event {
    /// The realization index this event belongs to.
    pub fn iens(&self) -> JobIndex {
        match *self {
            Event::Submitted { iens }
            | Event::Started { iens }
            | Event::Finished { iens, .. } => iens,
        }
    }

    /// Whether this event ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Finished { .. })
    }
}

/// Producer half of the event channel.
///
/// Clonable; sending never blocks. A send after the orchestrator dropped
/// the queue is silently discarded: a driver winding down must not fail
/// because nobody is listening anymore.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// Consumer half of the event channel, drained by the orchestrator.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    /// Await the next event in enqueue order.
    ///
    /// Returns `None` once every producer is gone and the queue is drained.
    pub async fn get(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Pop the next event without waiting, if one is already queued.
    pub fn try_get(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// True when no event is currently queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Number of currently queued events.
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Create a connected sender/queue pair.
///
/// Public so that backend implementations outside this crate can expose the
/// same queue type through the [`Driver`](crate::driver::Driver) trait.
pub fn channel() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventQueue { rx })
}
