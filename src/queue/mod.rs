//! Bounded job queue
//!
//! A fixed pool of worker threads pulls jobs from one shared bounded
//! channel. Each worker runs its jobs one at a time in arrival order, so a
//! single worker preserves submission order. A pending counter tracks every
//! admitted job until it has finished running, which is what `wait` and
//! `close` block on.

use crate::core::{OverflowCallback, OverflowPolicy, Result, TransportError, TransportMetrics};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use log::{error, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A unit of deferred work
pub trait Job: Send + 'static {
    fn run(self);
}

/// Type-erased closure job
pub type BoxedJob = Box<dyn FnOnce() + Send + 'static>;

impl Job for BoxedJob {
    fn run(self) {
        self()
    }
}

/// Admission state shared between producers and workers
struct QueueState {
    closed: AtomicBool,
    pending: Mutex<usize>,
    drained: Condvar,
}

impl QueueState {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            pending: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn begin(&self) {
        *self.pending.lock() += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.pending.lock()
    }

    fn wait_drained(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }
}

/// Fixed-capacity job queue with a fixed worker pool
///
/// # Example
///
/// ```
/// use log_intake_transport::queue::{BoxedJob, JobQueue};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let queue: JobQueue<BoxedJob> = JobQueue::new(10, 1);
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..5 {
///     let counter = Arc::clone(&counter);
///     queue.push(Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })).unwrap();
/// }
///
/// queue.wait();
/// assert_eq!(counter.load(Ordering::SeqCst), 5);
/// queue.close();
/// ```
pub struct JobQueue<J: Job> {
    sender: RwLock<Option<Sender<J>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    state: Arc<QueueState>,
    capacity: usize,
    concurrency: usize,
    overflow_policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
    metrics: Arc<TransportMetrics>,
}

impl<J: Job> JobQueue<J> {
    /// Create a queue that blocks producers when full
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `concurrency` is zero.
    #[must_use]
    pub fn new(capacity: usize, concurrency: usize) -> Self {
        Self::with_config(
            capacity,
            concurrency,
            OverflowPolicy::Block,
            None,
            Arc::new(TransportMetrics::new()),
        )
    }

    /// Create a queue with custom overflow handling and shared metrics
    ///
    /// One of the `capacity` slots is taken by the hand-off to a worker, so
    /// the channel itself buffers `capacity - 1` jobs. With `capacity == 1`
    /// every push is a direct rendezvous with an idle worker.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `concurrency` is zero.
    #[must_use]
    pub fn with_config(
        capacity: usize,
        concurrency: usize,
        overflow_policy: OverflowPolicy,
        on_overflow: Option<OverflowCallback>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        assert!(capacity >= 1, "capacity must be greater than or equal to 1");
        assert!(
            concurrency >= 1,
            "concurrency must be greater than or equal to 1"
        );

        let (sender, receiver) = bounded(capacity - 1);
        let state = Arc::new(QueueState::new());

        let workers = (0..concurrency)
            .map(|idx| {
                let receiver = receiver.clone();
                let state = Arc::clone(&state);
                let metrics = Arc::clone(&metrics);
                thread::Builder::new()
                    .name(format!("log-intake-worker-{}", idx))
                    .spawn(move || worker_loop(idx, receiver, state, metrics))
                    .expect("failed to spawn job queue worker")
            })
            .collect();

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            state,
            capacity,
            concurrency,
            overflow_policy,
            on_overflow,
            metrics,
        }
    }

    /// Submit a job
    ///
    /// Returns [`TransportError::QueueClosed`] without enqueuing once `close`
    /// has started. When the queue is full the configured overflow policy
    /// applies; under `Block` this call waits for a worker to free a slot.
    pub fn push(&self, job: J) -> Result<()> {
        if self.state.is_closed() {
            return Err(TransportError::QueueClosed);
        }

        // Cloned so a blocking send never holds the lock `close` needs.
        let sender = match self.sender.read().as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(TransportError::QueueClosed),
        };

        self.state.begin();
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => self.handle_full(&sender, job),
            Err(TrySendError::Disconnected(_)) => {
                self.state.finish();
                Err(TransportError::QueueClosed)
            }
        }
    }

    fn handle_full(&self, sender: &Sender<J>, job: J) -> Result<()> {
        self.metrics.record_queue_full();

        match self.overflow_policy {
            OverflowPolicy::Block => {
                self.metrics.record_block();
                sender.send(job).map_err(|_| {
                    self.state.finish();
                    TransportError::QueueClosed
                })
            }
            OverflowPolicy::BlockWithTimeout(timeout) => {
                self.metrics.record_block();
                match sender.send_timeout(job, timeout) {
                    Ok(()) => Ok(()),
                    Err(SendTimeoutError::Timeout(_)) => {
                        self.state.finish();
                        self.alert_and_drop();
                        Ok(())
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        self.state.finish();
                        Err(TransportError::QueueClosed)
                    }
                }
            }
            OverflowPolicy::DropNewest => {
                self.state.finish();
                self.alert_and_drop();
                Ok(())
            }
        }
    }

    fn alert_and_drop(&self) {
        let dropped_count = self.metrics.record_dropped();

        // Alert on first drop and periodically thereafter
        if dropped_count == 0 || (dropped_count + 1) % 1000 == 0 {
            warn!(
                "log intake queue full ({} slots), {} records dropped under {} policy",
                self.capacity,
                dropped_count + 1,
                self.overflow_policy
            );
            if let Some(ref callback) = self.on_overflow {
                callback(dropped_count + 1);
            }
        }
    }

    /// Block until every admitted job has finished running
    ///
    /// Jobs pushed while waiting extend the wait.
    pub fn wait(&self) {
        self.state.wait_drained();
    }

    /// Stop admissions, drain admitted jobs and stop the workers
    ///
    /// Calling it again after the first call only waits for the drain.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            self.wait();
            return;
        }

        self.wait();

        // Workers exit once the last sender is gone; a push that raced past
        // the closed check still holds a clone and gets its job run first.
        drop(self.sender.write().take());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("log intake worker thread panicked during shutdown");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Jobs admitted but not yet finished
    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }
}

impl<J: Job> Drop for JobQueue<J> {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop<J: Job>(
    idx: usize,
    receiver: Receiver<J>,
    state: Arc<QueueState>,
    metrics: Arc<TransportMetrics>,
) {
    for job in receiver.iter() {
        // A panicking job must not take the worker down or leak the pending
        // count that `wait` depends on.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || job.run()));
        if let Err(panic_info) = result {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            metrics.record_job_panic();
            error!(
                "log intake worker #{} job panicked: {}. Worker continues.",
                idx, panic_msg
            );
        }
        state.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn shared_log() -> Arc<Mutex<String>> {
        Arc::new(Mutex::new(String::new()))
    }

    #[test]
    fn test_jobs_run_in_order_with_single_worker() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(1, 1);
        let log = shared_log();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();

        let writer = Arc::clone(&log);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            writer.lock().push('2');
            unblock_tx.send(()).unwrap();
        });

        let first = Arc::clone(&log);
        queue
            .push(Box::new(move || {
                first.lock().push('1');
                unblock_rx.recv().unwrap();
            }))
            .unwrap();

        let third = Arc::clone(&log);
        queue
            .push(Box::new(move || third.lock().push('3')))
            .unwrap();

        queue.wait();
        assert_eq!(log.lock().as_str(), "123");
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(1, 1);
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();

        queue
            .push(Box::new(move || {
                unblock_rx.recv().unwrap();
            }))
            .unwrap();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            unblock_tx.send(()).unwrap();
        });

        queue.close();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let err = queue
            .push(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap_err();
        assert!(matches!(err, TransportError::QueueClosed));
        assert_eq!(queue.pending(), 0);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_close_drains_admitted_jobs() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(16, 1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            queue
                .push(Box::new(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        queue.close();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_close_twice_is_harmless() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(4, 2);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_wait_counts_in_flight_jobs() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(8, 2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let done = Arc::clone(&done);
            queue
                .push(Box::new(move || {
                    thread::sleep(Duration::from_millis(20));
                    done.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        queue.wait();
        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_wait_on_empty_queue_returns() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(3, 1);
        queue.wait();
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let queue: JobQueue<BoxedJob> = JobQueue::new(4, 1);
        let ran = Arc::new(AtomicBool::new(false));

        queue.push(Box::new(|| panic!("job failure"))).unwrap();
        let flag = Arc::clone(&ran);
        queue
            .push(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        queue.wait();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(queue.metrics().job_panics(), 1);
    }

    #[test]
    fn test_drop_newest_drops_when_full() {
        let metrics = Arc::new(TransportMetrics::new());
        let alerts = Arc::new(AtomicUsize::new(0));
        let alert_counter = Arc::clone(&alerts);
        let queue: JobQueue<BoxedJob> = JobQueue::with_config(
            2,
            1,
            OverflowPolicy::DropNewest,
            Some(Arc::new(move |_: u64| {
                alert_counter.fetch_add(1, Ordering::SeqCst);
            })),
            Arc::clone(&metrics),
        );

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
        queue
            .push(Box::new(move || {
                started_tx.send(()).unwrap();
                unblock_rx.recv().unwrap();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Worker is busy: one job fits in the buffer, the rest are dropped.
        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let executed = Arc::clone(&executed);
            queue
                .push(Box::new(move || {
                    executed.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        unblock_tx.send(()).unwrap();
        queue.wait();

        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.dropped_count(), 4);
        assert_eq!(metrics.queue_full_events(), 4);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_block_with_timeout_gives_up() {
        let metrics = Arc::new(TransportMetrics::new());
        let queue: JobQueue<BoxedJob> = JobQueue::with_config(
            1,
            1,
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(200)),
            None,
            Arc::clone(&metrics),
        );

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
        queue
            .push(Box::new(move || {
                started_tx.send(()).unwrap();
                unblock_rx.recv().unwrap();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        queue.push(Box::new(|| {})).unwrap();
        assert_eq!(metrics.dropped_count(), 1);
        assert!(metrics.block_events() >= 1);

        unblock_tx.send(()).unwrap();
        queue.wait();
    }

    #[test]
    fn test_block_policy_applies_backpressure() {
        let metrics = Arc::new(TransportMetrics::new());
        let queue: Arc<JobQueue<BoxedJob>> = Arc::new(JobQueue::with_config(
            1,
            1,
            OverflowPolicy::Block,
            None,
            Arc::clone(&metrics),
        ));

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
        queue
            .push(Box::new(move || {
                started_tx.send(()).unwrap();
                unblock_rx.recv().unwrap();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let producer_done = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let producer_done = Arc::clone(&producer_done);
            thread::spawn(move || {
                queue.push(Box::new(|| {})).unwrap();
                producer_done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!producer_done.load(Ordering::SeqCst));

        unblock_tx.send(()).unwrap();
        producer.join().unwrap();
        queue.wait();

        assert!(producer_done.load(Ordering::SeqCst));
        assert_eq!(metrics.dropped_count(), 0);
        assert!(metrics.block_events() >= 1);
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than or equal to 1")]
    fn test_zero_capacity_panics() {
        let _queue: JobQueue<BoxedJob> = JobQueue::new(0, 1);
    }

    #[test]
    #[should_panic(expected = "concurrency must be greater than or equal to 1")]
    fn test_zero_concurrency_panics() {
        let _queue: JobQueue<BoxedJob> = JobQueue::new(1, 0);
    }
}
