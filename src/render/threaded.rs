//! Renderer backed by a worker thread.
//!
//! One worker drains requests in order, so completions keep submission
//! order. The host polls with `try_recv` and never blocks unless it asks to
//! wait for the queue to drain.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RenderError;
use crate::host::{Completion, JobId, Renderer};
use crate::overlay::RenderElement;

use super::Typesetter;

enum Request {
    Typeset(JobId, RenderElement),
    Flush,
}

pub struct ThreadedRenderer {
    tx: Option<Sender<Request>>,
    rx: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
    in_flight: usize,
    ready: Vec<Completion>,
}

impl ThreadedRenderer {
    /// Spawn the worker thread.
    ///
    /// # Errors
    /// Returns an error if the operating system refuses to create the thread.
    pub fn spawn<T>(typesetter: T) -> Result<Self, RenderError>
    where
        T: Typesetter + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("formula-typesetter".to_string())
            .spawn(move || {
                for request in request_rx {
                    let completion = match request {
                        Request::Typeset(job, element) => Completion::Typeset {
                            job,
                            output: typesetter.render(element),
                        },
                        Request::Flush => Completion::Flush,
                    };
                    if done_tx.send(completion).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            tx: Some(request_tx),
            rx: done_rx,
            worker: Some(worker),
            in_flight: 0,
            ready: Vec::new(),
        })
    }

    /// Block until everything submitted so far has resolved or `timeout`
    /// elapses. Returns `true` if the queue drained.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.in_flight -= 1;
                    self.ready.push(completion);
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(error = %RenderError::WorkerGone, "render worker disconnected");
                    self.in_flight = 0;
                    return false;
                }
            }
        }
        true
    }

    fn send(&mut self, request: Request) {
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if sent {
            self.in_flight += 1;
        } else {
            tracing::warn!(error = %RenderError::WorkerGone, "dropping render request");
        }
    }
}

impl Renderer for ThreadedRenderer {
    fn submit(&mut self, job: JobId, element: RenderElement) {
        self.send(Request::Typeset(job, element));
    }

    fn schedule_flush(&mut self) {
        self.send(Request::Flush);
    }

    fn poll_completions(&mut self) -> Vec<Completion> {
        while let Ok(completion) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.ready.push(completion);
        }
        std::mem::take(&mut self.ready)
    }

    fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.ready.is_empty()
    }
}

impl Drop for ThreadedRenderer {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.tx = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!(error = %RenderError::WorkerGone, "render worker panicked");
        }
    }
}

impl std::fmt::Debug for ThreadedRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedRenderer")
            .field("in_flight", &self.in_flight)
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}
