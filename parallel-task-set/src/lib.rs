// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A bounded set of keyed tokio tasks.
//!
//! Every task spawned on a [ParallelTaskSet] is an independent unit of
//! isolation: a panic inside one task is captured and reported against that
//! task's key, and never disturbs its siblings.

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The default number of parallel tasks used by [ParallelTaskSet].
pub const DEFAULT_MAX_PARALLELISM: usize = 16;

/// Why a task in a [ParallelTaskSet] did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The task panicked; the panic message is preserved when it was a
    /// string.
    Panicked(String),
    /// The task was torn down by the runtime before it could report.
    Lost,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Panicked(message) => {
                write!(f, "task panicked: {message}")
            }
            TaskFailure::Lost => write!(f, "task terminated without output"),
        }
    }
}

impl std::error::Error for TaskFailure {}

/// A collection of tokio tasks, each identified by a key, which execute in
/// parallel up to a user-specified maximum amount of parallelism.
///
/// This parallelism is achieved by spawning tasks on a [JoinSet], with each
/// task holding a semaphore permit for as long as it runs.
///
/// # Why not just use a JoinSet?
///
/// The tokio [JoinSet] has no limit on the "maximum number of tasks", and a
/// panicking task surfaces as a `JoinError` that has lost track of which
/// piece of work it was doing. [ParallelTaskSet] bounds concurrency and
/// reports every spawned key exactly once, whether its task finished,
/// panicked, or disappeared.
pub struct ParallelTaskSet<K, T> {
    semaphore: Arc<Semaphore>,
    max_parallelism: usize,
    set: JoinSet<(K, Result<T, TaskFailure>)>,
    pending: BTreeSet<K>,
}

impl<K, T> Default for ParallelTaskSet<K, T>
where
    K: Clone + Ord + Send + 'static,
    T: Send + 'static,
{
    fn default() -> Self {
        ParallelTaskSet::new()
    }
}

impl<K, T> ParallelTaskSet<K, T>
where
    K: Clone + Ord + Send + 'static,
    T: Send + 'static,
{
    /// Creates a new [ParallelTaskSet], with [DEFAULT_MAX_PARALLELISM] as the
    /// maximum number of tasks to run in parallel.
    ///
    /// If a different amount of parallism is desired, refer to:
    /// [Self::new_with_parallelism].
    pub fn new() -> ParallelTaskSet<K, T> {
        Self::new_with_parallelism(DEFAULT_MAX_PARALLELISM)
    }

    /// Creates a new [ParallelTaskSet], with `max_parallelism` as the
    /// maximum number of tasks to run in parallel. A value of zero is treated
    /// as one.
    pub fn new_with_parallelism(
        max_parallelism: usize,
    ) -> ParallelTaskSet<K, T> {
        let max_parallelism = max_parallelism.max(1);
        let semaphore = Arc::new(Semaphore::new(max_parallelism));
        let set = JoinSet::new();

        Self { semaphore, max_parallelism, set, pending: BTreeSet::new() }
    }

    /// The maximum number of tasks this set runs at once.
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Number of spawned tasks that have not yet been joined.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Spawn a task immediately, but only allow it to execute if the task
    /// set is within the maximum parallelism constraint.
    ///
    /// Returns `false`, without spawning anything, if a task with the same
    /// key has not been joined yet.
    pub fn spawn<F>(&mut self, key: K, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        if !self.pending.insert(key.clone()) {
            return false;
        }

        let semaphore = Arc::clone(&self.semaphore);
        let _abort_handle = self.set.spawn(async move {
            // Hold onto the permit until the task finishes executing
            let permit = semaphore
                .acquire_owned()
                .await
                .expect("we never close the semaphore");
            let output = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| {
                    TaskFailure::Panicked(panic_message(payload))
                });
            drop(permit);
            (key, output)
        });
        true
    }

    /// Waits for the next task to complete and returns its key and output.
    ///
    /// Tasks which were torn down without reporting are returned last, as
    /// [TaskFailure::Lost], once every other task has been joined.
    pub async fn join_next(&mut self) -> Option<(K, Result<T, TaskFailure>)> {
        loop {
            match self.set.join_next().await {
                Some(Ok((key, output))) => {
                    self.pending.remove(&key);
                    return Some((key, output));
                }
                // Panics are caught inside the task, so a join error means
                // the task was cancelled. Its key is still in `pending` and
                // is reported once the set drains.
                Some(Err(_)) => continue,
                None => {
                    return self
                        .pending
                        .pop_first()
                        .map(|key| (key, Err(TaskFailure::Lost)));
                }
            }
        }
    }

    /// Wait for all tasks to execute and return their keyed output.
    pub async fn join_all(mut self) -> Vec<(K, Result<T, TaskFailure>)> {
        let mut outputs = Vec::with_capacity(self.pending.len());
        while let Some(output) = self.join_next().await {
            outputs.push(output);
        }
        outputs
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
