use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time;

use parking_lot::{Condvar, Mutex};

use log::info;

use thiserror::Error;

use crate::shutdown::Shutdown;

/// Worker cap of the default pooled strategy.
pub const DEFAULT_POOL_WORKERS: usize = 200;

/// Strategy for running the blocking section of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorConfig {
    /// Bounded pool of OS threads; excess work queues rather than erroring.
    Pooled { workers: usize },
    /// One lightweight task per dispatched unit of work, unbounded in count.
    PerTask,
}

/// Startup-time strategy selection. `virtual_threads` is the activation
/// flag read from the process configuration; its value never changes after
/// bootstrap.
pub fn select_executor(virtual_threads: bool) -> ExecutorConfig {
    if virtual_threads {
        ExecutorConfig::PerTask
    } else {
        ExecutorConfig::Pooled {
            workers: DEFAULT_POOL_WORKERS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("blocking wait interrupted by shutdown")]
    Interrupted,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dispatches the blocking section of each request onto a worker owned by
/// the active strategy. Built once at bootstrap, before the server accepts
/// connections; request handlers only dispatch to it.
pub struct Executor {
    mode: Mode,
    shutdown: Shutdown,
}

enum Mode {
    Pooled {
        queue: mpsc::UnboundedSender<Job>,
        gate: Arc<InterruptGate>,
    },
    PerTask {
        next_worker: AtomicU64,
    },
}

impl Executor {
    /// Must be called from within the runtime; the pooled mode spawns its
    /// worker threads and a shutdown watcher here.
    pub fn new(config: ExecutorConfig, shutdown: Shutdown) -> Self {
        let mode = match config {
            ExecutorConfig::Pooled { workers } => {
                let (queue, receiver) = mpsc::unbounded_channel::<Job>();
                let receiver = Arc::new(Mutex::new(receiver));

                for n in 0..workers {
                    let receiver = Arc::clone(&receiver);
                    thread::Builder::new()
                        .name(format!("pool-worker-{}", n))
                        .spawn(move || loop {
                            let job = receiver.lock().blocking_recv();
                            match job {
                                Some(job) => job(),
                                None => break,
                            }
                        })
                        .expect("Can't spawn a pool worker thread.");
                }

                let gate = Arc::new(InterruptGate::default());
                let watcher_gate = Arc::clone(&gate);
                let watcher = shutdown.clone();
                let mut signal = shutdown.subscribe();
                tokio::spawn(async move {
                    if !watcher.is_triggered() {
                        let _ = signal.recv().await;
                    }
                    watcher_gate.open();
                });

                Mode::Pooled { queue, gate }
            }
            ExecutorConfig::PerTask => Mode::PerTask {
                next_worker: AtomicU64::new(0),
            },
        };

        Self { mode, shutdown }
    }

    /// Runs the fixed-duration blocking wait on a worker of the active
    /// strategy. The worker logs the per-request line naming itself before
    /// it suspends. Shutdown is the only interruption source; a wait still
    /// queued when shutdown fires is failed, not slept.
    pub async fn dispatch_wait(&self, duration: Duration) -> Result<(), WaitError> {
        match &self.mode {
            Mode::Pooled { queue, gate } => {
                let gate = Arc::clone(gate);
                let (done_tx, done_rx) = oneshot::channel();

                let job: Job = Box::new(move || {
                    let worker = thread::current();
                    info!(
                        "start to sleep on {}",
                        worker.name().unwrap_or("pool-worker")
                    );
                    let _ = done_tx.send(gate.sleep(duration));
                });

                queue.send(job).map_err(|_| WaitError::Interrupted)?;
                done_rx.await.unwrap_or(Err(WaitError::Interrupted))
            }
            Mode::PerTask { next_worker } => {
                let worker = next_worker.fetch_add(1, Ordering::Relaxed);
                let mut signal = self.shutdown.subscribe();
                let triggered = self.shutdown.is_triggered();
                let (done_tx, done_rx) = oneshot::channel();

                tokio::spawn(async move {
                    info!("start to sleep on task-worker-{}", worker);
                    let outcome = if triggered {
                        Err(WaitError::Interrupted)
                    } else {
                        tokio::select! {
                            _ = time::sleep(duration) => Ok(()),
                            _ = signal.recv() => Err(WaitError::Interrupted),
                        }
                    };
                    let _ = done_tx.send(outcome);
                });

                done_rx.await.unwrap_or(Err(WaitError::Interrupted))
            }
        }
    }
}

/// Gate the pooled workers sleep behind. Opened exactly once, by shutdown;
/// an open gate fails every current and future sleep.
#[derive(Default)]
struct InterruptGate {
    interrupted: Mutex<bool>,
    signal: Condvar,
}

impl InterruptGate {
    fn open(&self) {
        let mut interrupted = self.interrupted.lock();
        *interrupted = true;
        self.signal.notify_all();
    }

    /// Blocks the calling thread for `duration`, unless the gate opens
    /// first.
    fn sleep(&self, duration: Duration) -> Result<(), WaitError> {
        let deadline = Instant::now() + duration;
        let mut interrupted = self.interrupted.lock();

        loop {
            if *interrupted {
                return Err(WaitError::Interrupted);
            }
            if self
                .signal
                .wait_until(&mut interrupted, deadline)
                .timed_out()
            {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_the_pool_by_default() {
        assert_eq!(
            select_executor(false),
            ExecutorConfig::Pooled {
                workers: DEFAULT_POOL_WORKERS
            }
        );
    }

    #[test]
    fn selects_per_task_workers_when_activated() {
        assert_eq!(select_executor(true), ExecutorConfig::PerTask);
    }

    #[tokio::test]
    async fn pooled_waits_queue_behind_busy_workers() {
        let executor = Arc::new(Executor::new(
            ExecutorConfig::Pooled { workers: 2 },
            Shutdown::new(),
        ));

        let started = Instant::now();
        let mut waits = Vec::new();
        for _ in 0..6 {
            let executor = Arc::clone(&executor);
            waits.push(tokio::spawn(async move {
                executor.dispatch_wait(Duration::from_millis(100)).await
            }));
        }
        for wait in waits {
            assert_eq!(wait.await.unwrap(), Ok(()));
        }

        // Six waits over two workers run in three batches of 100 ms.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn per_task_waits_run_concurrently() {
        let executor = Arc::new(Executor::new(ExecutorConfig::PerTask, Shutdown::new()));

        let started = Instant::now();
        let mut waits = Vec::new();
        for _ in 0..50 {
            let executor = Arc::clone(&executor);
            waits.push(tokio::spawn(async move {
                executor.dispatch_wait(Duration::from_millis(200)).await
            }));
        }
        for wait in waits {
            assert_eq!(wait.await.unwrap(), Ok(()));
        }

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_pooled_wait() {
        let shutdown = Shutdown::new();
        let executor = Arc::new(Executor::new(
            ExecutorConfig::Pooled { workers: 1 },
            shutdown.clone(),
        ));

        let wait = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.dispatch_wait(Duration::from_secs(30)).await })
        };

        time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        assert_eq!(wait.await.unwrap(), Err(WaitError::Interrupted));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_per_task_wait() {
        let shutdown = Shutdown::new();
        let executor = Arc::new(Executor::new(ExecutorConfig::PerTask, shutdown.clone()));

        let wait = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.dispatch_wait(Duration::from_secs(30)).await })
        };

        time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        assert_eq!(wait.await.unwrap(), Err(WaitError::Interrupted));
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_an_interruption() {
        let shutdown = Shutdown::new();
        let executor = Executor::new(ExecutorConfig::PerTask, shutdown.clone());

        shutdown.trigger();

        assert_eq!(
            executor.dispatch_wait(Duration::from_secs(30)).await,
            Err(WaitError::Interrupted)
        );
    }

    #[tokio::test]
    async fn queued_waits_are_failed_by_shutdown() {
        let shutdown = Shutdown::new();
        let executor = Arc::new(Executor::new(
            ExecutorConfig::Pooled { workers: 1 },
            shutdown.clone(),
        ));

        // The first wait occupies the only worker; the second stays queued.
        let mut waits = Vec::new();
        for _ in 0..2 {
            let executor = Arc::clone(&executor);
            waits.push(tokio::spawn(async move {
                executor.dispatch_wait(Duration::from_secs(30)).await
            }));
        }

        time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        for wait in waits {
            assert_eq!(wait.await.unwrap(), Err(WaitError::Interrupted));
        }
    }
}
