use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use jobdrive::driver::{Driver, DriverFuture, JobSpec};
use jobdrive::errors::Result;
use jobdrive::events::{self, Event, EventQueue, EventSender, JobIndex};

/// A fake driver that:
/// - records which jobs were submitted and killed
/// - immediately emits the full `Submitted`/`Started`/`Finished` lifecycle
///   for each submitted job, with returncode 0.
pub struct FakeDriver {
    events: EventSender,
    queue: Option<EventQueue>,
    shutdown: watch::Sender<bool>,
    submitted: Arc<Mutex<Vec<JobIndex>>>,
    killed: Arc<Mutex<Vec<JobIndex>>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let (events, queue) = events::channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            events,
            queue: Some(queue),
            shutdown,
            submitted: Arc::new(Mutex::new(Vec::new())),
            killed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submitted(&self) -> Vec<JobIndex> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<JobIndex> {
        self.killed.lock().unwrap().clone()
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for FakeDriver {
    fn submit(&self, iens: JobIndex, _spec: JobSpec) -> DriverFuture<'_, Result<()>> {
        Box::pin(async move {
            self.submitted.lock().unwrap().push(iens);
            self.events.send(Event::Submitted { iens });
            self.events.send(Event::Started { iens });
            self.events.send(Event::Finished {
                iens,
                returncode: 0,
                aborted: false,
            });
            Ok(())
        })
    }

    fn kill(&self, iens: JobIndex) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.killed.lock().unwrap().push(iens);
        })
    }

    fn poll(&self) -> DriverFuture<'static, ()> {
        let mut shutdown = self.shutdown.subscribe();
        Box::pin(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn finish(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.shutdown.send(true);
        })
    }

    fn take_event_queue(&mut self) -> Option<EventQueue> {
        self.queue.take()
    }
}
