//! Lifecycle coordinator for concurrent service tasks.
//!
//! A [`TaskGroup`] runs a set of (run, interrupt) pairs concurrently and
//! links their lifetimes: the moment any run future returns, every task
//! whose run has not yet returned gets its interrupt invoked. `run` then
//! blocks until all runs have returned, so no task outlives the group.
//!
//! # Example
//!
//! ```ignore
//! let mut group = TaskGroup::new();
//!
//! let shutdown = ShutdownSignal::new();
//! let interrupt = shutdown.clone();
//! group.add(
//!     async move { listener_loop(shutdown).await },
//!     move || interrupt.trigger(),
//! );
//!
//! group.run().await?;
//! ```

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::task::JoinSet;

/// Failure of one service task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A listener failed to bind or serve.
    #[error("listener error: {0}")]
    Listener(String),

    /// Shutdown of a task's resources failed.
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// The task's run future panicked or was aborted.
    #[error("task panicked: {0}")]
    Panicked(String),
}

type RunFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
type Interrupt = Box<dyn FnOnce() + Send>;

struct ServiceTask {
    run: RunFuture,
    interrupt: Interrupt,
}

/// Group of service tasks with linked lifetimes.
///
/// One-shot: consumed by [`TaskGroup::run`].
#[derive(Default)]
pub struct TaskGroup {
    tasks: Vec<ServiceTask>,
}

impl TaskGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Adds a (run, interrupt) pair.
    ///
    /// `interrupt` must cause `run` to return promptly; it is invoked at
    /// most once, and only while `run` has not yet returned.
    pub fn add<F, I>(&mut self, run: F, interrupt: I)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
        I: FnOnce() + Send + 'static,
    {
        self.tasks.push(ServiceTask {
            run: Box::pin(run),
            interrupt: Box::new(interrupt),
        });
    }

    /// Returns the number of tasks added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` when no tasks have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task concurrently until all have returned.
    ///
    /// The first return (success or failure) interrupts all still-running
    /// peers. The outcome is `Ok(())` iff every run succeeded; otherwise the
    /// first failure in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskError`] any run produced, or
    /// [`TaskError::Panicked`] when a run future panicked.
    pub async fn run(self) -> Result<(), TaskError> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let mut set = JoinSet::new();
        let mut interrupts: Vec<Option<Interrupt>> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.into_iter().enumerate() {
            interrupts.push(Some(task.interrupt));
            let run = task.run;
            set.spawn(async move { (index, run.await) });
        }

        let mut first_error: Option<TaskError> = None;
        let mut interrupted = false;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    // This run has returned; its interrupt must not fire.
                    interrupts[index] = None;
                    if let Err(e) = result {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(TaskError::Panicked(join_error.to_string()));
                    }
                }
            }

            if !interrupted {
                interrupted = true;
                for slot in &mut interrupts {
                    if let Some(interrupt) = slot.take() {
                        interrupt();
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
