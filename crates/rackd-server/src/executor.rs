//! Control thread executor.
//!
//! Some plugin formats must be created and destroyed on one well-known thread.
//! [`ControlExecutor`] owns that thread and runs submitted tasks in order.
//! Synchronous submitters block until their task has finished.

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use rackd_plugin::{HostError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct ControlExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ControlExecutor {
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Ends once every sender is gone and the queue is drained
                for task in receiver {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("control thread task panicked");
                    }
                }
                tracing::debug!("control thread stopped");
            })?;
        let thread_id = thread.thread().id();

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    pub fn is_control_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(task).map_err(|e| e.into_inner()),
            None => Err(task),
        }
    }

    /// Run `f` on the control thread and wait for its result. Runs inline when
    /// called from the control thread itself.
    pub fn run_sync<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_control_thread() {
            return Ok(f());
        }

        let (reply_tx, reply_rx) = bounded(1);
        let task: Task = Box::new(move || {
            let _ = reply_tx.send(f());
        });

        if self.submit(task).is_err() {
            return Err(HostError::ControlThread(
                "control thread is shut down".to_string(),
            ));
        }

        reply_rx.recv().map_err(|_| {
            HostError::ControlThread("task did not complete on the control thread".to_string())
        })
    }

    /// Queue `f` without waiting. After shutdown the task runs on the caller's thread.
    pub fn run_async<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(task) = self.submit(Box::new(f)) {
            tracing::warn!("control thread is shut down, running task inline");
            task();
        }
    }

    /// Stop accepting tasks, drain the queue and join the thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        if self.is_control_thread() {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ControlExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
