//! Single-worker task sequencer.
//!
//! All mutable session state lives on one dedicated thread. Callers never
//! touch it directly; they submit closures that receive `&mut S` and run one
//! at a time in submission order. Delayed tasks (upload retries) wait in a
//! deadline heap on the same worker, so there is exactly one thread touching
//! the state and no locking around it.
//!
//! Shutdown stops accepting work from callers, lets already-queued immediate
//! tasks (and the follow-up tasks they submit) finish, discards pending
//! delayed tasks, and waits up to [`SHUTDOWN_TIMEOUT`] before detaching the
//! worker.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::logging::event_names;

/// How long `shutdown` waits for queued work before detaching the worker.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// A unit of work run against the worker-owned state.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Command<S> {
    Run(Task<S>),
    Schedule { deadline: Instant, task: Task<S> },
    Shutdown,
}

struct Shared {
    accepting: AtomicBool,
    aborted: AtomicBool,
    worker: OnceLock<ThreadId>,
}

impl Shared {
    fn on_worker(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }

    /// Callers are refused after shutdown; tasks already running on the
    /// worker may still queue follow-up work.
    fn admits(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) || self.on_worker()
    }
}

/// Cloneable submission handle.
pub struct SequencerHandle<S> {
    sender: Sender<Command<S>>,
    shared: Arc<Shared>,
}

impl<S> Clone for SequencerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Send + 'static> SequencerHandle<S> {
    /// Enqueue a task. Returns `false` (and drops the task) once the
    /// sequencer has shut down.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if !self.shared.admits() {
            tracing::debug!(
                event = event_names::TASK_DROPPED,
                "sequencer shut down; dropping task"
            );
            return false;
        }
        self.sender.send(Command::Run(Box::new(task))).is_ok()
    }

    /// Enqueue a task to run no earlier than `delay` from now.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if !self.shared.admits() {
            tracing::debug!(
                event = event_names::TASK_DROPPED,
                delay_ms = delay.as_millis() as u64,
                "sequencer shut down; dropping delayed task"
            );
            return false;
        }
        let deadline = Instant::now() + delay;
        self.sender
            .send(Command::Schedule {
                deadline,
                task: Box::new(task),
            })
            .is_ok()
    }

    /// Run `f` on the worker and wait for its result.
    ///
    /// Returns `None` if the sequencer is shut down or the task panicked.
    /// Must not be called from inside a task: the worker would wait on
    /// itself.
    pub fn call<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.on_worker() {
            tracing::error!("blocking call issued from the sequencer worker");
            return None;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let submitted = self.submit(move |state| {
            let _ = tx.send(f(state));
        });
        if !submitted {
            return None;
        }
        rx.recv().ok()
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }
}

/// Owner of the worker thread.
pub struct TaskSequencer<S> {
    handle: SequencerHandle<S>,
    worker: Option<JoinHandle<()>>,
    finished: Receiver<()>,
}

impl<S: Send + 'static> TaskSequencer<S> {
    /// Spawn the worker with an initial state.
    pub fn start(name: &str, state: S) -> io::Result<Self> {
        Self::start_with(name, move |_| state)
    }

    /// Spawn the worker with a state built from its own handle, for state
    /// that needs to submit follow-up work.
    pub fn start_with<F>(name: &str, init: F) -> io::Result<Self>
    where
        F: FnOnce(SequencerHandle<S>) -> S,
    {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            accepting: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
            worker: OnceLock::new(),
        });
        let handle = SequencerHandle {
            sender,
            shared: Arc::clone(&shared),
        };
        let state = init(handle.clone());
        let (done_tx, finished) = mpsc::channel();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = shared.worker.set(thread::current().id());
                run_worker(state, receiver, &shared);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            handle,
            worker: Some(worker),
            finished,
        })
    }

    pub fn handle(&self) -> SequencerHandle<S> {
        self.handle.clone()
    }

    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle.submit(task)
    }

    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle.schedule(delay, task)
    }

    pub fn call<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.call(f)
    }
}

impl<S> TaskSequencer<S> {
    /// Stop accepting work and wait for queued tasks.
    ///
    /// Returns `true` if the worker finished within [`SHUTDOWN_TIMEOUT`].
    /// Otherwise the worker is told to stop before its next task and is
    /// detached. Idempotent.
    pub fn shutdown(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        self.handle.shared.accepting.store(false, Ordering::SeqCst);
        let _ = self.handle.sender.send(Command::Shutdown);

        match self.finished.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                self.handle.shared.aborted.store(true, Ordering::SeqCst);
                tracing::warn!(
                    event = event_names::SEQUENCER_ABORTED,
                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                    "worker did not finish in time; detaching"
                );
                false
            }
        }
    }
}

impl<S> Drop for TaskSequencer<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Delayed<S> {
    deadline: Instant,
    seq: u64,
    task: Task<S>,
}

impl<S> PartialEq for Delayed<S> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<S> Eq for Delayed<S> {}

impl<S> PartialOrd for Delayed<S> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Delayed<S> {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must pop
    // first; equal deadlines keep scheduling order.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn run_worker<S>(mut state: S, commands: Receiver<Command<S>>, shared: &Shared) {
    let mut delayed: BinaryHeap<Delayed<S>> = BinaryHeap::new();
    let mut next_seq = 0u64;
    let mut discarded = 0usize;
    let mut draining = false;

    loop {
        if shared.aborted.load(Ordering::SeqCst) {
            break;
        }

        if draining {
            match commands.try_recv() {
                Ok(Command::Run(task)) => run_task(&mut state, task),
                Ok(Command::Schedule { .. }) => discarded += 1,
                Ok(Command::Shutdown) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
            continue;
        }

        let now = Instant::now();
        if delayed.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = delayed.pop() {
                run_task(&mut state, due.task);
            }
            continue;
        }

        let command = match delayed.peek() {
            Some(next) => match commands.recv_timeout(next.deadline.saturating_duration_since(now)) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            Command::Run(task) => run_task(&mut state, task),
            Command::Schedule { deadline, task } => {
                next_seq += 1;
                delayed.push(Delayed {
                    deadline,
                    seq: next_seq,
                    task,
                });
            }
            Command::Shutdown => draining = true,
        }
    }

    discarded += delayed.len();
    if discarded > 0 {
        tracing::debug!(
            event = event_names::TASK_DROPPED,
            discarded,
            "discarding delayed tasks at shutdown"
        );
    }
}

fn run_task<S>(state: &mut S, task: Task<S>) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task(state))) {
        tracing::error!(
            event = event_names::TASK_PANICKED,
            message = %panic_message(panic.as_ref()),
            "task panicked; worker continues"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
