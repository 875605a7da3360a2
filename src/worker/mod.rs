//! # Worker Thread
//!
//! One background thread that runs long jobs as a sequence of short steps,
//! so the thread that owns the session (usually a GUI) keeps control of
//! latency. The two threads cooperate through channels; the session's coarse
//! lock is only ever held inside a step, never across one.
//!
//! ## Protocol
//!
//! ```text
//! control thread                worker thread
//! --------------                -------------
//! start(task)   -- Start -->    step() ... step()
//!               <- Progress --  after each step
//!               <- Finished --  task returned Done
//! cancel()      -- Cancel -->   drops the task between steps
//!   (blocks)    <- Cancelled -- handshake ack
//! drop/stop     -- Stop ---->   loop exits, thread joins
//! ```
//!
//! Cancellation is cooperative: the worker only checks for commands between
//! steps, so a step is never interrupted mid-write and everything a task
//! already wrote stays written. [`Worker::cancel`] blocks until the ack
//! arrives; when it returns, the worker is provably idle and the caller may
//! mutate shared state without racing a half-finished job. A cancel with no
//! job running acks immediately.
//!
//! Starting a task while another runs replaces the old one without an event;
//! the caller asked for the replacement and gets progress for the new job.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::query::Query;

/// What a task's step tells the worker to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Call `step` again.
    More,
    /// The job is complete.
    Done,
}

/// A resumable job. Steps should stay near the session's step time budget;
/// the worker checks for cancellation only between them.
pub trait Task: Send {
    fn step(&mut self) -> Result<StepOutcome>;

    /// `(completed, total)` units for progress events; `(0, 0)` when the
    /// task cannot estimate.
    fn progress(&self) -> (usize, usize) {
        (0, 0)
    }
}

enum Command {
    Start(Box<dyn Task>),
    Cancel,
    Stop,
}

/// What the worker reports back to the control thread.
#[derive(Debug)]
pub enum Event {
    Progress { completed: usize, total: usize },
    Finished,
    Cancelled,
    Failed(Error),
}

/// Handle to the worker thread; dropping it stops and joins the thread.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    commands: Sender<Command>,
    events: Receiver<Event>,
}

impl Worker {
    pub fn spawn() -> Self {
        let (command_tx, command_rx) = channel();
        let (event_tx, event_rx) = channel();

        let handle = thread::spawn(move || run(command_rx, event_tx));

        Self {
            handle: Some(handle),
            commands: command_tx,
            events: event_rx,
        }
    }

    /// Hands a job to the worker, replacing any job already running.
    pub fn start(&self, task: Box<dyn Task>) {
        if self.commands.send(Command::Start(task)).is_err() {
            warn!("worker is gone; task dropped");
        }
    }

    /// Cancels the running job and blocks until the worker acks.
    ///
    /// Events queued before the ack are discarded; the caller asked for the
    /// job's death and has no use for its last progress reports.
    pub fn cancel(&self) {
        if self.commands.send(Command::Cancel).is_err() {
            return;
        }
        while let Ok(event) = self.events.recv() {
            if matches!(event, Event::Cancelled) {
                break;
            }
        }
    }

    /// Next event if one is queued; never blocks.
    pub fn try_event(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Blocks for the next event; `None` means the worker is gone.
    pub fn wait_event(&self) -> Option<Event> {
        self.events.recv().ok()
    }

    /// Blocks up to `timeout` for the next event.
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stops the loop and joins the thread. Runs automatically on drop.
    pub fn stop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(commands: Receiver<Command>, events: Sender<Event>) {
    let mut task: Option<Box<dyn Task>> = None;

    loop {
        // Idle blocks on the channel; busy polls it between steps.
        let command = if task.is_none() {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        } else {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        };

        match command {
            Some(Command::Start(new_task)) => task = Some(new_task),
            Some(Command::Cancel) => {
                task = None;
                let _ = events.send(Event::Cancelled);
                continue;
            }
            Some(Command::Stop) => break,
            None => {}
        }

        let Some(active) = task.as_mut() else { continue };

        match active.step() {
            Ok(StepOutcome::More) => {
                let (completed, total) = active.progress();
                let _ = events.send(Event::Progress { completed, total });
            }
            Ok(StepOutcome::Done) => {
                let _ = events.send(Event::Finished);
                task = None;
            }
            Err(e) => {
                let _ = events.send(Event::Failed(e));
                task = None;
            }
        }
    }

    debug!("worker loop exited");
}

/// Runs a query's phased page pipeline ([`Query::next_state`]) as a worker
/// job: the GUI starts one after a predicate change and renders pages as
/// progress events arrive.
pub struct QueryStateTask {
    query: Query,
}

impl QueryStateTask {
    /// The query must already be planned with [`Query::exec`].
    pub fn new(query: Query) -> Self {
        Self { query }
    }
}

impl Task for QueryStateTask {
    fn step(&mut self) -> Result<StepOutcome> {
        if self.query.next_state()? {
            Ok(StepOutcome::More)
        } else {
            Ok(StepOutcome::Done)
        }
    }

    fn progress(&self) -> (usize, usize) {
        self.query.progress()
    }
}
