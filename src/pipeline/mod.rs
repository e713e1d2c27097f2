//! Concurrent quantization with strictly ordered output
//!
//! Frames are submitted from any thread and quantized inline, on the rayon
//! pool, or on the caller's own threads. A single consumer drives
//! [`Pipeline::poll`], which writes each frame once it is ready and its index
//! matches the write cursor.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{EncodingError, Result};
use crate::params::Settings;
use crate::quant::CancellationToken;
use crate::traits::{HasParameters, Parameter};
use crate::writer::{Compress, Encoder, IndexedFrame, Lzw};

mod task;

use self::task::{FrameTask, Next, Queue};

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Started,
    /// `finish` was called, frames still being written
    Finishing,
    Complete,
    Failed,
}

/// Result of a [`Pipeline::poll`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The stream was aborted, discard the output
    Failed,
    /// The next frame is not submitted or not quantized yet
    Waiting,
    /// One frame was written
    FrameWritten,
    /// The trailer was written, the stream is done
    StreamComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexMode {
    Sequential,
    Explicit,
}

/// State shared between producers and the consumer
struct Shared {
    state: State,
    queue: Queue,
    next_index: u32,
    mode: Option<IndexMode>,
    width: u16,
    height: u16,
    cancel: CancellationToken,
}

impl Shared {
    fn new() -> Shared {
        Shared {
            state: State::NotStarted,
            queue: Queue::default(),
            next_index: 0,
            mode: None,
            width: 0,
            height: 0,
            cancel: CancellationToken::new(),
        }
    }

    fn release(&mut self) {
        self.queue.clear();
        self.next_index = 0;
        self.mode = None;
    }
}

type Dump<W> = Box<dyn FnOnce(&W) -> std::io::Result<()> + Send>;

/// Consumer side, only touched by `start`, `poll` and `abort`
struct Output<W: Write> {
    encoder: Option<Encoder<W>>,
    cursor: u32,
    finished: Option<W>,
    dump: Option<Dump<W>>,
    error: Option<EncodingError>,
}

impl<W: Write> Output<W> {
    fn new() -> Output<W> {
        Output {
            encoder: None,
            cursor: 0,
            finished: None,
            dump: None,
            error: None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Animated GIF encoder pipeline
///
/// ```no_run
/// use neugif::{Pipeline, Poll, Delay, HasParameters};
///
/// let mut pipeline: Pipeline<Vec<u8>> = Pipeline::new();
/// pipeline.set(Delay(10));
/// pipeline.start(Vec::new(), 2, 2).unwrap();
/// pipeline.submit(&[255, 0, 0].repeat(4)).unwrap();
/// pipeline.finish().unwrap();
/// while pipeline.poll() == Poll::FrameWritten {}
/// let gif = pipeline.into_inner().unwrap();
/// ```
pub struct Pipeline<W: Write> {
    settings: Settings,
    compressor: Box<dyn Compress>,
    written: AtomicU32,
    shared: Mutex<Shared>,
    output: Mutex<Output<W>>,
}

impl<W: Write> HasParameters for Pipeline<W> {}

impl<T, W> Parameter<Pipeline<W>> for T
where
    T: Parameter<Settings>,
    W: Write,
{
    fn set_param(self, this: &mut Pipeline<W>) {
        this.settings.set(self);
    }
}

impl<W: Write> Default for Pipeline<W> {
    fn default() -> Self {
        Pipeline::new()
    }
}

impl<W: Write> Pipeline<W> {
    pub fn new() -> Pipeline<W> {
        Pipeline::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Pipeline<W> {
        Pipeline {
            settings,
            compressor: Box::new(Lzw),
            written: AtomicU32::new(0),
            shared: Mutex::new(Shared::new()),
            output: Mutex::new(Output::new()),
        }
    }

    /// Replaces the entropy coder used for the image data
    pub fn with_compressor<C: Compress + 'static>(mut self, compressor: C) -> Pipeline<W> {
        self.compressor = Box::new(compressor);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> State {
        lock(&self.shared).state
    }

    /// Number of frames written so far. Pixel buffers of frames below this
    /// index are no longer needed.
    pub fn written(&self) -> u32 {
        self.written.load(Ordering::Acquire)
    }

    /// Token that cancels every quantization of the current stream
    pub fn cancellation(&self) -> CancellationToken {
        lock(&self.shared).cancel.clone()
    }

    /// Cancels in-flight quantization; the next `poll` reports `Failed`.
    pub fn cancel(&self) {
        lock(&self.shared).cancel.cancel()
    }

    /// Starts a new stream on `w` and writes the signature.
    ///
    /// A pipeline that completed or failed can be started again.
    pub fn start(&self, w: W, width: u16, height: u16) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(EncodingError::InvalidDimensions { width, height });
        }
        let mut out = lock(&self.output);
        let mut shared = lock(&self.shared);
        if let State::Started | State::Finishing = shared.state {
            return Err(EncodingError::OrderingViolation("stream already started"));
        }
        *shared = Shared::new();
        *out = Output::new();
        self.written.store(0, Ordering::Release);

        let mut encoder = Encoder::new(w, width, height).with_repeat(self.settings.repeat());
        if let Err(err) = encoder.write_signature() {
            warn!(error = %err, "could not write the GIF signature");
            shared.state = State::Failed;
            return Err(err.into());
        }
        out.encoder = Some(encoder);
        shared.width = width;
        shared.height = height;
        shared.state = State::Started;
        debug!(width, height, "stream started");
        Ok(())
    }

    /// Links a new task into the queue
    fn enqueue(&self, index: Option<u32>, len: usize) -> Result<(Arc<FrameTask>, CancellationToken)> {
        let mut shared = lock(&self.shared);
        Self::accepting(&shared)?;
        Self::check_len(&shared, len)?;
        let index = Self::assign(&mut shared, index)?;
        let task = FrameTask::frame(index, self.settings.frame_params());
        shared.queue.push(task.clone());
        Ok((task, shared.cancel.clone()))
    }

    fn accepting(shared: &Shared) -> Result<()> {
        match shared.state {
            State::Started => Ok(()),
            State::Finishing => Err(EncodingError::OrderingViolation(
                "frame submitted after finish",
            )),
            _ => Err(EncodingError::NotStarted),
        }
    }

    fn check_len(shared: &Shared, len: usize) -> Result<()> {
        let expected = shared.width as usize * shared.height as usize * 3;
        if len != expected {
            return Err(EncodingError::InvalidPixelData {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    fn assign(shared: &mut Shared, index: Option<u32>) -> Result<u32> {
        let mode = match index {
            Some(_) => IndexMode::Explicit,
            None => IndexMode::Sequential,
        };
        match shared.mode {
            Some(current) if current != mode => {
                return Err(EncodingError::OrderingViolation(
                    "sequential and explicit frame indices mixed",
                ))
            }
            _ => shared.mode = Some(mode),
        }
        Ok(index.unwrap_or_else(|| {
            let next = shared.next_index;
            shared.next_index += 1;
            next
        }))
    }

    /// Quantizes the next frame on the calling thread.
    ///
    /// Returns the frame index. A quantization failure is not reported here
    /// but by the next `poll`.
    pub fn submit(&self, pixels: &[u8]) -> Result<u32> {
        let (task, cancel) = self.enqueue(None, pixels.len())?;
        task.run(pixels, &cancel);
        Ok(task.index)
    }

    /// Quantizes frame `index` on the calling thread, frames may arrive in
    /// any order. Cannot be mixed with [`submit`](Self::submit).
    pub fn submit_at(&self, index: u32, pixels: &[u8]) -> Result<u32> {
        let (task, cancel) = self.enqueue(Some(index), pixels.len())?;
        task.run(pixels, &cancel);
        Ok(task.index)
    }

    /// Queues the next frame and quantizes it on the rayon pool.
    pub fn spawn<P: Into<Arc<[u8]>>>(&self, pixels: P) -> Result<u32> {
        self.spawn_inner(None, pixels.into())
    }

    /// Queues frame `index` and quantizes it on the rayon pool.
    pub fn spawn_at<P: Into<Arc<[u8]>>>(&self, index: u32, pixels: P) -> Result<u32> {
        self.spawn_inner(Some(index), pixels.into())
    }

    fn spawn_inner(&self, index: Option<u32>, pixels: Arc<[u8]>) -> Result<u32> {
        let (task, cancel) = self.enqueue(index, pixels.len())?;
        let index = task.index;
        rayon::spawn(move || task.run(&pixels, &cancel));
        Ok(index)
    }

    /// Queues a batch of frames with consecutive indices and quantizes them
    /// in parallel, returning once every frame is done.
    pub fn submit_batch<P: AsRef<[u8]> + Sync>(&self, frames: &[P]) -> Result<Range<u32>> {
        let (tasks, cancel) = {
            let mut shared = lock(&self.shared);
            Self::accepting(&shared)?;
            for pixels in frames {
                Self::check_len(&shared, pixels.as_ref().len())?;
            }
            let params = self.settings.frame_params();
            let mut tasks = Vec::with_capacity(frames.len());
            for _ in frames {
                let index = Self::assign(&mut shared, None)?;
                let task = FrameTask::frame(index, params);
                shared.queue.push(task.clone());
                tasks.push(task);
            }
            (tasks, shared.cancel.clone())
        };
        let range = match (tasks.first(), tasks.last()) {
            (Some(first), Some(last)) => first.index..last.index + 1,
            _ => {
                let next = lock(&self.shared).next_index;
                next..next
            }
        };
        tasks
            .par_iter()
            .zip(frames.par_iter())
            .for_each(|(task, pixels)| task.run(pixels.as_ref(), &cancel));
        Ok(range)
    }

    /// Marks the end of the stream. Does not block, keep polling until
    /// `StreamComplete` or `Failed`.
    pub fn finish(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        match shared.state {
            State::Started => {}
            State::Finishing => {
                return Err(EncodingError::OrderingViolation("finish called twice"))
            }
            _ => return Err(EncodingError::NotStarted),
        }
        let index = shared.next_index;
        shared.queue.push(FrameTask::finalize(index));
        shared.state = State::Finishing;
        debug!(queued = shared.queue.len() - 1, "stream finishing");
        Ok(())
    }

    /// Writes the next frame if it is ready.
    ///
    /// Must be called repeatedly until it returns `StreamComplete` or
    /// `Failed`. Any error observed here aborts the stream.
    pub fn poll(&self) -> Poll {
        let mut out = lock(&self.output);
        match self.step(&mut out) {
            Ok(poll) => poll,
            Err(err) => {
                self.abort_locked(&mut out, Some(err));
                Poll::Failed
            }
        }
    }

    fn step(&self, out: &mut Output<W>) -> Result<Poll> {
        let next = {
            let mut shared = lock(&self.shared);
            match shared.state {
                State::Complete => return Ok(Poll::StreamComplete),
                State::NotStarted | State::Failed => return Ok(Poll::Failed),
                State::Started | State::Finishing => {}
            }
            shared.queue.next(out.cursor)?
        };
        match next {
            Next::Waiting => Ok(Poll::Waiting),
            Next::Frame(task) => {
                self.write_frame(out, &task)?;
                Ok(Poll::FrameWritten)
            }
            Next::End => {
                self.complete(out)?;
                Ok(Poll::StreamComplete)
            }
        }
    }

    fn write_frame(&self, out: &mut Output<W>, task: &FrameTask) -> Result<()> {
        let (params, quantized) = match (task.params(), task.result()) {
            (Some(params), Some(quantized)) => (params, quantized),
            _ => return Err(EncodingError::OrderingViolation("frame has no pixel data")),
        };
        let encoder = out.encoder.as_mut().ok_or(EncodingError::NotStarted)?;
        encoder.write_frame(
            &IndexedFrame {
                delay: params.delay,
                dispose: params.dispose,
                transparent: quantized.transparent,
                palette: &quantized.color_table,
                buffer: &quantized.indices,
            },
            &*self.compressor,
        )?;
        out.cursor += 1;
        self.written.store(out.cursor, Ordering::Release);
        debug!(index = task.index, "frame written");
        Ok(())
    }

    fn complete(&self, out: &mut Output<W>) -> Result<()> {
        let mut encoder = out.encoder.take().ok_or(EncodingError::NotStarted)?;
        encoder.write_trailer()?;
        let w = encoder.into_inner();
        if let Some(dump) = out.dump.take() {
            dump(&w)?;
        }
        out.finished = Some(w);
        let mut shared = lock(&self.shared);
        shared.release();
        shared.state = State::Complete;
        debug!(frames = out.cursor, "stream complete");
        Ok(())
    }

    /// Aborts the stream: cancels in-flight quantization, drops every queued
    /// frame and the destination. Calling it again has no effect.
    pub fn abort(&self) {
        let mut out = lock(&self.output);
        self.abort_locked(&mut out, None);
    }

    fn abort_locked(&self, out: &mut Output<W>, err: Option<EncodingError>) {
        let mut shared = lock(&self.shared);
        match shared.state {
            State::Started | State::Finishing => {
                match err {
                    Some(ref err) => warn!(error = %err, "stream aborted"),
                    None => warn!("stream aborted"),
                }
                shared.state = State::Failed;
            }
            State::NotStarted | State::Failed | State::Complete => {}
        }
        shared.cancel.cancel();
        shared.release();
        out.encoder = None;
        out.cursor = 0;
        out.dump = None;
        if err.is_some() {
            out.error = err;
        }
        self.written.store(0, Ordering::Release);
    }

    /// The error that aborted the stream, if any
    pub fn take_error(&self) -> Option<EncodingError> {
        lock(&self.output).error.take()
    }

    /// Takes the destination after `StreamComplete`
    pub fn take_output(&self) -> Option<W> {
        lock(&self.output).finished.take()
    }

    /// Consumes the pipeline, returning the destination after `StreamComplete`
    pub fn into_inner(self) -> Option<W> {
        self.output
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    /// Polls until the stream completes or fails, yielding while waiting.
    pub fn run_to_end(&self) -> Result<()> {
        loop {
            match self.poll() {
                Poll::FrameWritten => {}
                Poll::Waiting => thread::yield_now(),
                Poll::StreamComplete => return Ok(()),
                Poll::Failed => return Err(self.take_error().unwrap_or(EncodingError::NotStarted)),
            }
        }
    }
}

impl Pipeline<BufWriter<File>> {
    /// Starts a stream written to the file at `path`
    pub fn start_file<P: AsRef<Path>>(&self, path: P, width: u16, height: u16) -> Result<()> {
        let file = File::create(path)?;
        self.start(BufWriter::new(file), width, height)
    }
}

impl Pipeline<Vec<u8>> {
    /// Starts a stream accumulated in memory
    pub fn start_memory(&self, width: u16, height: u16) -> Result<()> {
        self.start(Vec::with_capacity(10 * 1024), width, height)
    }

    /// Like [`finish`](Self::finish), and also saves the whole buffer to
    /// `path` once the stream completes.
    pub fn finish_to_file<P: Into<PathBuf>>(&self, path: P) -> Result<()> {
        let path = path.into();
        let mut out = lock(&self.output);
        self.finish()?;
        out.dump = Some(Box::new(move |buf: &Vec<u8>| fs::write(&path, buf)));
        Ok(())
    }
}
