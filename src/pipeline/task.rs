//! Frame tasks and the submission-order queue
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{EncodingError, Result};
use crate::params::FrameParams;
use crate::quant::{CancellationToken, Quantized};

#[derive(Debug)]
pub(crate) enum TaskKind {
    Frame(FrameParams),
    /// No more frames will be submitted
    Finalize,
}

/// Unit of quantization work for one frame.
///
/// `completed` and `failed` are each set at most once, by whoever runs the
/// quantizer, and are only read by the poller.
#[derive(Debug)]
pub(crate) struct FrameTask {
    pub index: u32,
    pub kind: TaskKind,
    result: OnceLock<Quantized>,
    error: Mutex<Option<EncodingError>>,
    completed: AtomicBool,
    failed: AtomicBool,
}

impl FrameTask {
    pub fn frame(index: u32, params: FrameParams) -> Arc<FrameTask> {
        Arc::new(FrameTask::new(index, TaskKind::Frame(params), false))
    }

    pub fn finalize(index: u32) -> Arc<FrameTask> {
        Arc::new(FrameTask::new(index, TaskKind::Finalize, true))
    }

    fn new(index: u32, kind: TaskKind, completed: bool) -> FrameTask {
        FrameTask {
            index,
            kind,
            result: OnceLock::new(),
            error: Mutex::new(None),
            completed: AtomicBool::new(completed),
            failed: AtomicBool::new(false),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn params(&self) -> Option<&FrameParams> {
        match self.kind {
            TaskKind::Frame(ref params) => Some(params),
            TaskKind::Finalize => None,
        }
    }

    /// Quantized frame, available once the task completed
    pub fn result(&self) -> Option<&Quantized> {
        if self.is_completed() {
            self.result.get()
        } else {
            None
        }
    }

    pub fn take_error(&self) -> Option<EncodingError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Quantizes `pixels` and publishes the outcome.
    pub fn run(&self, pixels: &[u8], cancel: &CancellationToken) {
        let params = match self.params() {
            Some(params) => params,
            None => return,
        };
        if self.is_completed() || self.is_failed() {
            return;
        }
        match Quantized::new(pixels, params.sample, params.transparent, cancel) {
            Ok(quantized) => {
                let _ = self.result.set(quantized);
                self.completed.store(true, Ordering::Release);
            }
            Err(err) => {
                *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                self.failed.store(true, Ordering::Release);
            }
        }
    }
}

/// What the poller should do next
pub(crate) enum Next {
    /// The frame at the write cursor is ready and was removed from the queue
    Frame(Arc<FrameTask>),
    Waiting,
    /// Every frame was written and the stream was finalized
    End,
}

/// Tasks in submission order
#[derive(Debug, Default)]
pub(crate) struct Queue {
    tasks: Vec<Arc<FrameTask>>,
}

impl Queue {
    pub fn push(&mut self, task: Arc<FrameTask>) {
        self.tasks.push(task)
    }

    pub fn clear(&mut self) {
        self.tasks.clear()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Searches for the frame whose index equals `cursor`.
    ///
    /// Out-of-order submission can put later frames closer to the front, so
    /// the whole queue is scanned. A failed task, a frame below the cursor, a
    /// duplicate, or a gap left after finalizing all end the stream.
    pub fn next(&mut self, cursor: u32) -> Result<Next> {
        if let Some(task) = self.tasks.iter().find(|t| t.is_failed()) {
            return Err(task.take_error().unwrap_or(EncodingError::Cancelled));
        }
        let mut found = None;
        let mut finalized = false;
        let mut remaining = 0;
        for (pos, task) in self.tasks.iter().enumerate() {
            if let TaskKind::Finalize = task.kind {
                finalized = true;
                continue;
            }
            remaining += 1;
            if task.index < cursor {
                return Err(EncodingError::OrderingViolation(
                    "frame index was already written",
                ));
            }
            if task.index == cursor {
                if found.is_some() {
                    return Err(EncodingError::OrderingViolation("duplicate frame index"));
                }
                found = Some(pos);
            }
        }
        match found {
            Some(pos) if self.tasks[pos].is_completed() => Ok(Next::Frame(self.tasks.remove(pos))),
            Some(_) => Ok(Next::Waiting),
            None if finalized && remaining == 0 => Ok(Next::End),
            None if finalized => Err(EncodingError::OrderingViolation(
                "stream finished with missing frames",
            )),
            None => Ok(Next::Waiting),
        }
    }
}
