//! Renderer that resolves on demand.

use std::collections::VecDeque;

use crate::host::{Completion, JobId, Renderer};
use crate::overlay::RenderElement;

use super::{PlainTypesetter, Typesetter};

#[derive(Debug)]
enum Request {
    Typeset(JobId, RenderElement),
    Flush,
}

/// Keeps submissions in a queue until the host resolves them.
///
/// Nothing completes by itself, so a test can move the cursor or edit the
/// buffer between any two completions.
#[derive(Debug, Default)]
pub struct FifoRenderer<T = PlainTypesetter> {
    typesetter: T,
    queue: VecDeque<Request>,
    resolved: Vec<Completion>,
    submitted: usize,
}

impl FifoRenderer<PlainTypesetter> {
    pub fn new() -> Self {
        Self::with_typesetter(PlainTypesetter)
    }
}

impl<T: Typesetter> FifoRenderer<T> {
    pub fn with_typesetter(typesetter: T) -> Self {
        Self {
            typesetter,
            queue: VecDeque::new(),
            resolved: Vec::new(),
            submitted: 0,
        }
    }

    /// Resolve the oldest queued entry. Returns `false` if the queue was empty.
    pub fn resolve_next(&mut self) -> bool {
        let Some(request) = self.queue.pop_front() else {
            return false;
        };
        let completion = match request {
            Request::Typeset(job, element) => Completion::Typeset {
                job,
                output: self.typesetter.render(element),
            },
            Request::Flush => Completion::Flush,
        };
        self.resolved.push(completion);
        true
    }

    /// Resolve up to `count` entries, returning how many resolved.
    pub fn resolve(&mut self, count: usize) -> usize {
        (0..count).take_while(|_| self.resolve_next()).count()
    }

    /// Resolve everything currently queued.
    pub fn resolve_all(&mut self) -> usize {
        let mut count = 0;
        while self.resolve_next() {
            count += 1;
        }
        count
    }

    /// Entries still waiting to resolve (jobs and flush continuations).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total jobs ever submitted.
    pub const fn submitted(&self) -> usize {
        self.submitted
    }
}

impl<T: Typesetter> Renderer for FifoRenderer<T> {
    fn submit(&mut self, job: JobId, element: RenderElement) {
        self.submitted += 1;
        self.queue.push_back(Request::Typeset(job, element));
    }

    fn schedule_flush(&mut self) {
        self.queue.push_back(Request::Flush);
    }

    fn poll_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.resolved)
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.resolved.is_empty()
    }
}
