// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size worker pool running the record, decode and play loops.
//!
//! Each loop runs to completion on one worker. Submission never blocks: once
//! every worker is busy and the queue is full, further tasks are rejected.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use tracing::{debug, error};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pool of named worker threads fed by a bounded queue.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers (`aacdemo-worker-0`, ...) sharing a queue of
    /// `queue_capacity` pending tasks.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] for an empty pool, [`Error::Io`] if a thread
    /// cannot be spawned.
    pub fn new(threads: usize, queue_capacity: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid_arg("worker pool needs at least one thread"));
        }
        let (sender, receiver) = bounded::<Job>(queue_capacity);
        let workers = (0..threads)
            .map(|n| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("aacdemo-worker-{n}"))
                    .spawn(move || run_worker(receiver))
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        debug!("Started {} workers, queue capacity {}", threads, queue_capacity);
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queues `task` and returns a handle to its result.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] if the queue is full.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::invalid_state("worker pool shut down"))?;
        let (done, result) = bounded(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            if let Err(message) = &outcome {
                error!("Task panicked: {}", message);
            }
            // The handle may have been dropped; nobody is waiting then.
            let _ = done.send(outcome);
        });
        match sender.try_send(job) {
            Ok(()) => Ok(TaskHandle { result }),
            Err(TrySendError::Full(_)) => Err(Error::Rejected),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::invalid_state("worker pool shut down"))
            }
        }
    }

    /// Lets queued tasks finish, then joins every worker.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!("Failed to join {}", name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn run_worker(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        job();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Completion of a submitted task.
pub struct TaskHandle<T> {
    result: Receiver<std::result::Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run.
    ///
    /// # Errors
    ///
    /// [`Error::TaskFailed`] if the task panicked or was dropped unrun.
    pub fn wait(self) -> Result<T> {
        match self.result.recv() {
            Ok(outcome) => outcome.map_err(Error::TaskFailed),
            Err(_) => Err(Error::TaskFailed("task was never run".to_string())),
        }
    }

    /// Returns the result if the task is done, without blocking.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.result.try_recv() {
            Ok(outcome) => Some(outcome.map_err(Error::TaskFailed)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(Error::TaskFailed("task was never run".to_string())))
            }
        }
    }
}
