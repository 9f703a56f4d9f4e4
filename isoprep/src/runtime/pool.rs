use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{PrepError, PrepResult};

/// Token shared by every task of a pool, used to interrupt them at once.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent cancel is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolState {
    /// Accepting submissions.
    Open,
    /// No new submissions; submitted work keeps running.
    Closed,
    /// Submitted work has been interrupted.
    Terminated,
}

/// How a submitted unit of work ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Finished(T),
    Panicked(String),
    Cancelled,
}

/// Posted by every submitted task exactly once, whatever happened to it.
#[derive(Debug)]
pub struct CompletionToken<T> {
    /// Submission order of the task.
    pub index: usize,
    pub outcome: TaskOutcome<T>,
}

/// Fixed-size pool running at most `threads` units of work at a time.
///
/// Each unit is its own tokio task that must hold a permit while running.
/// Closing the pool stops submissions; terminating it also interrupts running
/// and queued work at its next await point.
pub struct WorkerPool {
    threads: usize,
    permits: Arc<Semaphore>,
    shutdown: ShutdownToken,
    state: PoolState,
    handles: Vec<JoinHandle<()>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("available_permits", &self.permits.available_permits())
            .field("state", &self.state)
            .field("tasks", &self.handles.len())
            .finish()
    }
}

impl WorkerPool {
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidConfiguration`] when `threads` is zero.
    pub fn new(threads: usize) -> PrepResult<Self> {
        if threads == 0 {
            return Err(PrepError::invalid("preparation threads must be positive"));
        }
        Ok(Self {
            threads,
            permits: Arc::new(Semaphore::new(threads)),
            shutdown: ShutdownToken::new(),
            state: PoolState::Open,
            handles: Vec::new(),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Spawn `work`; its completion token is posted on `completions`.
    ///
    /// A unit that returns an error or panics cancels the shutdown token
    /// before its slot is released, so work still waiting for a slot never
    /// starts.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::PoolClosed`] unless the pool is open.
    pub fn submit<F, T, E>(
        &mut self,
        index: usize,
        work: F,
        completions: mpsc::UnboundedSender<CompletionToken<Result<T, E>>>,
    ) -> PrepResult<()>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if self.state != PoolState::Open {
            return Err(PrepError::PoolClosed);
        }

        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let run = async move {
                let permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (TaskOutcome::Cancelled, None),
                };
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(value) => TaskOutcome::Finished(value),
                    Err(panic) => TaskOutcome::Panicked(panic_message(panic)),
                };
                (outcome, Some(permit))
            };

            let (outcome, permit) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => (TaskOutcome::Cancelled, None),
                finished = run => finished,
            };

            if !matches!(outcome, TaskOutcome::Finished(Ok(_))) {
                shutdown.cancel();
            }
            let _ = completions.send(CompletionToken { index, outcome });
            drop(permit);
        });

        self.handles.push(handle);
        Ok(())
    }

    /// Stop accepting submissions. Already submitted work keeps running.
    pub fn close(&mut self) {
        if self.state == PoolState::Open {
            self.state = PoolState::Closed;
        }
    }

    /// Interrupt everything that was submitted and refuse further work.
    pub fn terminate(&mut self) {
        if self.state == PoolState::Terminated {
            return;
        }
        tracing::warn!(threads = self.threads, "terminating preparation pool");
        self.state = PoolState::Terminated;
        self.shutdown.cancel();
        self.permits.close();
    }

    /// Terminate and detach every spawned task without waiting for it.
    ///
    /// Tokens already posted stay readable on the completion channel.
    pub fn abort(&mut self) {
        self.terminate();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Wait for every spawned task to exit.
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!("preparation task failed: {err:?}");
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "preparation job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_shutdown_token_shared_state() {
        let token = ShutdownToken::new();
        let clone1 = token.clone();
        let clone2 = token.clone();

        token.cancel();

        assert!(clone1.is_cancelled());
        assert!(clone2.is_cancelled());
        timeout(Duration::from_secs(1), clone1.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_token_cancelled_wakes_clones() {
        let token = ShutdownToken::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let clone = token.clone();
                tokio::spawn(async move { clone.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let results = timeout(Duration::from_secs(5), futures::future::join_all(handles))
            .await
            .expect("waiters did not observe cancellation within 5 seconds");
        for r in results {
            r.expect("waiter task panicked");
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = WorkerPool::new(0).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let mut pool = WorkerPool::new(2).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for index in 0..5 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            pool.submit(
                index,
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ()>(index)
                },
                tx.clone(),
            )
            .unwrap();
        }
        drop(tx);
        pool.close();

        let mut seen = Vec::new();
        while let Some(token) = rx.recv().await {
            match token.outcome {
                TaskOutcome::Finished(Ok(value)) => assert_eq!(value, token.index),
                other => panic!("unexpected outcome {other:?}"),
            }
            seen.push(token.index);
        }
        pool.join().await;

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_submissions() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel::<CompletionToken<Result<(), ()>>>();
        pool.close();
        assert_eq!(pool.state(), PoolState::Closed);
        assert!(matches!(
            pool.submit(0, async { Ok(()) }, tx.clone()),
            Err(PrepError::PoolClosed)
        ));

        pool.terminate();
        assert_eq!(pool.state(), PoolState::Terminated);
        assert!(matches!(
            pool.submit(0, async { Ok(()) }, tx),
            Err(PrepError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn test_terminate_interrupts_running_and_queued_work() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for index in 0..2 {
            pool.submit(
                index,
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<(), ()>(())
                },
                tx.clone(),
            )
            .unwrap();
        }
        drop(tx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.terminate();

        let mut outcomes = Vec::new();
        while let Some(token) =
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap()
        {
            outcomes.push(token.outcome);
        }
        pool.join().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, TaskOutcome::Cancelled)));
    }

    async fn explode() -> Result<(), ()> {
        panic!("partitioner exploded")
    }

    #[tokio::test]
    async fn test_abort_does_not_wait_for_running_work() {
        let mut pool = WorkerPool::new(2).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(
            0,
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), &str>(())
            },
            tx.clone(),
        )
        .unwrap();
        pool.submit(1, async { Err("broken graph") }, tx).unwrap();

        let token = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.index, 1);

        pool.abort();
        assert_eq!(pool.state(), PoolState::Terminated);
        timeout(Duration::from_secs(1), pool.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_work_still_posts_token() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(0, explode(), tx).unwrap();

        let token = rx.recv().await.unwrap();
        match token.outcome {
            TaskOutcome::Panicked(message) => assert!(message.contains("exploded")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(pool.shutdown_token().is_cancelled());
        pool.join().await;
    }

    #[tokio::test]
    async fn test_failure_keeps_queued_work_from_starting() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Arc::new(AtomicUsize::new(0));

        pool.submit(0, async { Err::<(), _>("broken graph") }, tx.clone())
            .unwrap();
        for index in 1..3 {
            let started = Arc::clone(&started);
            pool.submit(
                index,
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                tx.clone(),
            )
            .unwrap();
        }
        drop(tx);
        pool.close();

        let mut outcomes = Vec::new();
        while let Some(token) = rx.recv().await {
            outcomes.push((token.index, token.outcome));
        }
        pool.join().await;
        outcomes.sort_by_key(|(index, _)| *index);

        assert!(matches!(outcomes[0].1, TaskOutcome::Finished(Err("broken graph"))));
        assert!(outcomes[1..]
            .iter()
            .all(|(_, outcome)| matches!(outcome, TaskOutcome::Cancelled)));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }
}
