//! Background command execution.
//!
//! Long-running commands (the body of a progress dialog, for example) run on a
//! [`WorkerPool`] so the UI thread can keep pumping the host loop. The pool
//! defaults to a single thread: at most one background command runs at a
//! time.
//!
//! A job reports completion through a lock-guarded slot in its
//! [`JobHandle`]. The UI thread checks [`JobHandle::is_finished`] from inside
//! a cooperative wait; it never blocks on the job directly.
//!
//! Cancellation is cooperative. [`CancellationToken::cancel`] only sets a
//! flag the job may check; the thread is never killed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{EventLoop, Host, WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::default()).unwrap();
//! let host: Arc<dyn Host> = Arc::new(EventLoop::new());
//!
//! let job = pool.spawn(|_token| 6 * 7);
//! host.wait_until(&|| job.is_finished()).unwrap();
//! assert_eq!(job.try_take(), Some(42));
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};
use crate::event_loop::Host;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// A flag for cooperative job cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
enum Completion<T> {
    Pending,
    Done(T),
    Panicked,
    Taken,
}

#[derive(Debug)]
struct JobState<T> {
    completion: Mutex<Completion<T>>,
}

/// A handle to a spawned job.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: u64,
    state: Arc<JobState<T>>,
    token: CancellationToken,
}

impl<T> JobHandle<T> {
    /// The unique job ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the job has stopped running, successfully or not.
    pub fn is_finished(&self) -> bool {
        !matches!(*self.state.completion.lock(), Completion::Pending)
    }

    /// Take the result if the job finished successfully.
    ///
    /// Returns `None` while the job runs, after it panicked, or once the
    /// result was taken.
    pub fn try_take(&self) -> Option<T> {
        let mut completion = self.state.completion.lock();
        match std::mem::replace(&mut *completion, Completion::Taken) {
            Completion::Done(value) => Some(value),
            other => {
                *completion = other;
                None
            }
        }
    }

    /// Take the result of a finished job.
    ///
    /// Fails with [`Error::Cancelled`] if the job panicked or its result was
    /// already taken.
    pub fn take(&self) -> Result<T> {
        self.try_take().ok_or(Error::Cancelled)
    }

    /// Pump `host` until the job finishes, then take its result.
    pub fn wait_on(&self, host: &dyn Host) -> Result<T> {
        host.wait_until(&|| self.is_finished())?;
        self.take()
    }

    /// Request cancellation of the job.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The job's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub num_threads: usize,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            thread_name: "trellis-worker".to_string(),
            stack_size: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Default configuration with a custom thread name prefix.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
            ..Default::default()
        }
    }
}

/// Runs background commands.
pub struct WorkerPool {
    pool: RayonThreadPool,
    active_jobs: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool with `config`.
    pub fn new(config: WorkerPoolConfig) -> Result<Self> {
        let name = config.thread_name.clone();
        let mut builder = ThreadPoolBuilder::new()
            .num_threads(config.num_threads.max(1))
            .thread_name(move |index| format!("{name}-{index}"));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let pool = builder.build().map_err(Error::handler)?;
        tracing::debug!(
            target: "trellis_core::worker",
            threads = pool.current_num_threads(),
            "worker pool created"
        );
        Ok(Self {
            pool,
            active_jobs: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Number of jobs spawned and not yet finished.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    /// Run `job` in the background.
    ///
    /// The job receives the token of the returned handle.
    pub fn spawn<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce(CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let state = Arc::new(JobState {
            completion: Mutex::new(Completion::Pending),
        });

        let job_state = state.clone();
        let job_token = token.clone();
        let active_jobs = self.active_jobs.clone();
        active_jobs.fetch_add(1, Ordering::AcqRel);

        self.pool.spawn(move || {
            tracing::trace!(target: "trellis_core::worker", id, "job started");
            let outcome = catch_unwind(AssertUnwindSafe(|| job(job_token)));
            let completion = match outcome {
                Ok(value) => Completion::Done(value),
                Err(_) => {
                    tracing::warn!(target: "trellis_core::worker", id, "job panicked");
                    Completion::Panicked
                }
            };
            active_jobs.fetch_sub(1, Ordering::AcqRel);
            *job_state.completion.lock() = completion;
            tracing::trace!(target: "trellis_core::worker", id, "job finished");
        });

        JobHandle { id, state, token }
    }

    /// Run `job` in the background and hand its result to `callback` on the
    /// host loop thread.
    pub fn spawn_with_callback<F, T, C>(
        &self,
        host: Arc<dyn Host>,
        job: F,
        callback: C,
    ) -> CancellationToken
    where
        F: FnOnce(CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
        C: FnOnce(T) -> Result<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let job_token = token.clone();
        let active_jobs = self.active_jobs.clone();
        active_jobs.fetch_add(1, Ordering::AcqRel);

        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| job(job_token)));
            active_jobs.fetch_sub(1, Ordering::AcqRel);
            match outcome {
                Ok(value) => {
                    host.post(Box::new(move || callback(value)));
                }
                Err(_) => {
                    tracing::warn!(
                        target: "trellis_core::worker",
                        "job panicked; callback dropped"
                    );
                }
            }
        });

        token
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads())
            .field("active_jobs", &self.active_jobs())
            .finish()
    }
}

static_assertions::assert_impl_all!(WorkerPool: Send, Sync);
static_assertions::assert_impl_all!(JobHandle<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::event_loop::EventLoop;

    fn pool() -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig::with_name("test-worker")).unwrap()
    }

    #[test]
    fn defaults_to_one_thread() {
        assert_eq!(pool().num_threads(), 1);
    }

    #[test]
    fn job_result_is_taken_once() {
        let pool = pool();
        let host = EventLoop::new();
        let job = pool.spawn(|_| "done".to_string());
        assert_eq!(job.wait_on(&host).unwrap(), "done");
        assert!(job.is_finished());
        assert!(job.try_take().is_none());
        assert!(matches!(job.take(), Err(Error::Cancelled)));
    }

    #[test]
    fn cooperative_cancellation() {
        let pool = pool();
        let host = EventLoop::new();
        let job = pool.spawn(|token| {
            let mut steps = 0;
            while !token.is_cancelled() && steps < 1000 {
                std::thread::sleep(Duration::from_millis(1));
                steps += 1;
            }
            steps
        });
        job.cancel();
        let steps = job.wait_on(&host).unwrap();
        assert!(steps < 1000);
        assert!(job.token().check().is_err());
    }

    #[test]
    fn panicking_job_finishes_without_result() {
        let pool = pool();
        let host = EventLoop::new();
        let job = pool.spawn(|_| -> u8 { panic!("boom") });
        assert!(matches!(job.wait_on(&host), Err(Error::Cancelled)));
        assert_eq!(pool.active_jobs(), 0);
    }

    #[test]
    fn callback_runs_on_the_pumping_thread() {
        let pool = pool();
        let host: Arc<dyn Host> = Arc::new(EventLoop::new());
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let pump_thread = std::thread::current().id();

        pool.spawn_with_callback(
            host.clone(),
            |_| 7_u32,
            move |value| {
                *seen_clone.lock() = Some((value, std::thread::current().id()));
                Ok(())
            },
        );

        host.wait_until(&|| seen.lock().is_some()).unwrap();
        assert_eq!(*seen.lock(), Some((7, pump_thread)));
    }
}
