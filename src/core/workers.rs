//! Dedicated background threads with a command queue in and a result queue out.
//!
//! Every asynchronous resource in the appliance (image decoding, directory
//! ingestion) follows the same shape:
//!
//! - **Command queue**: unbounded crossbeam channel, serviced strictly FIFO by
//!   one thread.
//! - **Result queue**: unbounded channel the control thread drains without
//!   blocking (`drain()`).
//! - **Shutdown**: push `Message::Stop`, then join with a deadline.
//!
//! A fault inside a handler (panic or error) is caught at the loop boundary and
//! logged. The thread keeps going; only `Stop` ends it.
//!
//! # Example
//! ```ignore
//! let mut worker = Worker::spawn("doubler", |n: u32| n * 2)?;
//! worker.send(21);
//! // ...later, on the control thread:
//! for n in worker.drain() { println!("{n}"); }
//! worker.shutdown();
//! ```

use std::any::Any;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, trace, warn};

/// Default time `shutdown()` waits for the thread before detaching it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Envelope on a worker's command queue.
#[derive(Debug)]
pub enum Message<T> {
    Job(T),
    /// Sentinel: finish the loop and exit.
    Stop,
}

/// Periodic background job driven by `Worker::spawn_poller`.
pub trait Poll: Send + 'static {
    type Command: Send + 'static;
    type Output: Send + 'static;

    /// Handle a command from the control thread.
    fn command(&mut self, command: Self::Command);

    /// Do one round of work. Errors trigger the fault backoff.
    fn poll(&mut self) -> anyhow::Result<Vec<Self::Output>>;
}

/// Single background thread with FIFO requests and non-blocking results.
pub struct Worker<Req, Resp> {
    name: String,
    requests: Sender<Message<Req>>,
    results: Receiver<Resp>,
    handle: Option<thread::JoinHandle<()>>,
    join_timeout: Duration,
}

impl<Req, Resp> Worker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawn a worker that answers each request with `handler(request)`.
    pub fn spawn<F>(name: &str, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(Req) -> Resp + Send + 'static,
    {
        let (req_tx, req_rx) = unbounded::<Message<Req>>();
        let (res_tx, res_rx) = unbounded::<Resp>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("frameloop-{}", name))
            .spawn(move || {
                debug!("Worker {} started", thread_name);

                while let Ok(message) = req_rx.recv() {
                    let request = match message {
                        Message::Job(request) => request,
                        Message::Stop => break,
                    };

                    match catch_unwind(AssertUnwindSafe(|| handler(request))) {
                        Ok(response) => {
                            if res_tx.send(response).is_err() {
                                // Nobody is listening any more
                                break;
                            }
                        }
                        Err(payload) => {
                            error!(
                                "Worker {} fault: {}",
                                thread_name,
                                panic_message(payload.as_ref())
                            );
                        }
                    }
                }

                debug!("Worker {} stopped", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            requests: req_tx,
            results: res_rx,
            handle: Some(handle),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        })
    }

    /// Spawn a worker that calls `service.poll()` every `interval`, and waits
    /// `backoff` instead after a fault.
    pub fn spawn_poller<P>(
        name: &str,
        interval: Duration,
        backoff: Duration,
        mut service: P,
    ) -> io::Result<Self>
    where
        P: Poll<Command = Req, Output = Resp>,
    {
        let (req_tx, req_rx) = unbounded::<Message<Req>>();
        let (res_tx, res_rx) = unbounded::<Resp>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("frameloop-{}", name))
            .spawn(move || {
                debug!("Poller {} started (every {:?})", thread_name, interval);
                let mut wait = interval;

                loop {
                    match req_rx.recv_timeout(wait) {
                        Ok(Message::Job(command)) => {
                            service.command(command);
                            continue;
                        }
                        Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    match catch_unwind(AssertUnwindSafe(|| service.poll())) {
                        Ok(Ok(outputs)) => {
                            wait = interval;
                            for output in outputs {
                                if res_tx.send(output).is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            error!("Poller {} fault: {:#}; backing off {:?}", thread_name, e, backoff);
                            wait = backoff;
                        }
                        Err(payload) => {
                            error!(
                                "Poller {} fault: {}; backing off {:?}",
                                thread_name,
                                panic_message(payload.as_ref()),
                                backoff
                            );
                            wait = backoff;
                        }
                    }
                }

                debug!("Poller {} stopped", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            requests: req_tx,
            results: res_rx,
            handle: Some(handle),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        })
    }

    /// Queue a request. Returns false if the thread is gone.
    pub fn send(&self, request: Req) -> bool {
        match self.requests.send(Message::Job(request)) {
            Ok(()) => true,
            Err(e) => {
                error!("Worker {}: failed to enqueue job: {}", self.name, e);
                false
            }
        }
    }

    /// Take every result produced so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<Resp> {
        self.results.try_iter().collect()
    }

    /// Take the oldest result, if any. Never blocks.
    pub fn try_recv(&self) -> Option<Resp> {
        self.results.try_recv().ok()
    }

    /// Block up to `timeout` for one result. Meant for tests and shutdown paths.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Resp> {
        self.results.recv_timeout(timeout).ok()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Send the sentinel and wait (bounded) for the thread to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        trace!("Worker {} shutting down...", self.name);
        // The thread may already be gone; that's fine
        let _ = self.requests.send(Message::Stop);

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker {} did not stop within {:?}, detaching",
                    self.name, self.join_timeout
                );
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }

        if handle.join().is_err() {
            warn!("Worker {} panicked during shutdown", self.name);
        }
        trace!("Worker {} stopped gracefully", self.name);
    }
}

impl<Req, Resp> Drop for Worker<Req, Resp> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.requests.send(Message::Stop);

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_worker_fifo_order() {
        let mut worker = Worker::spawn("test-fifo", |n: u32| n * 10).unwrap();
        for n in 0..5 {
            assert!(worker.send(n));
        }

        let mut got = Vec::new();
        while got.len() < 5 {
            got.push(worker.recv_timeout(WAIT).expect("result"));
        }
        assert_eq!(got, vec![0, 10, 20, 30, 40]);

        worker.shutdown();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_worker_survives_panic() {
        let mut worker = Worker::spawn("test-panic", |n: u32| {
            if n == 1 {
                panic!("bad input");
            }
            n
        })
        .unwrap();

        worker.send(1);
        worker.send(2);
        assert_eq!(worker.recv_timeout(WAIT), Some(2));
        assert!(worker.is_running());
        worker.shutdown();
    }

    #[test]
    fn test_drain_is_non_blocking() {
        let worker = Worker::spawn("test-drain", |n: u32| n).unwrap();
        assert!(worker.drain().is_empty());
    }

    #[test]
    fn test_shutdown_twice_is_noop() {
        let mut worker = Worker::spawn("test-twice", |n: u32| n).unwrap();
        worker.shutdown();
        worker.shutdown();
        assert!(!worker.send(1));
    }

    struct Counter {
        count: u32,
        fail_next: bool,
    }

    impl Poll for Counter {
        type Command = bool;
        type Output = u32;

        fn command(&mut self, fail_next: bool) {
            self.fail_next = fail_next;
        }

        fn poll(&mut self) -> anyhow::Result<Vec<u32>> {
            if self.fail_next {
                self.fail_next = false;
                anyhow::bail!("transient");
            }
            self.count += 1;
            Ok(vec![self.count])
        }
    }

    #[test]
    fn test_poller_emits_and_stops() {
        let mut poller = Worker::spawn_poller(
            "test-poll",
            Duration::from_millis(5),
            Duration::from_millis(5),
            Counter { count: 0, fail_next: false },
        )
        .unwrap();

        assert_eq!(poller.recv_timeout(WAIT), Some(1));
        assert_eq!(poller.recv_timeout(WAIT), Some(2));
        poller.shutdown();
        assert!(!poller.is_running());
    }

    #[test]
    fn test_poller_recovers_after_fault() {
        let poller = Worker::spawn_poller(
            "test-backoff",
            Duration::from_millis(5),
            Duration::from_millis(20),
            Counter { count: 0, fail_next: true },
        )
        .unwrap();

        // First poll fails, the next one after backoff succeeds
        assert_eq!(poller.recv_timeout(WAIT), Some(1));
        assert!(poller.is_running());
    }
}
