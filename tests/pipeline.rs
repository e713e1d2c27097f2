use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use neugif::{
    Compress, Delay, DisposalMethod, EncodingError, HasParameters, Lzw, Pipeline, Poll,
    Quality, Repeat, Settings, State, Transparent,
};

const W: u16 = 8;
const H: u16 = 8;

fn solid(color: [u8; 3]) -> Vec<u8> {
    color.repeat(W as usize * H as usize)
}

fn frames() -> Vec<Vec<u8>> {
    vec![solid([255, 0, 0]), solid([0, 255, 0]), solid([0, 0, 255])]
}

fn decode(data: &[u8]) -> Vec<gif::Frame<'static>> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(data).unwrap();
    let mut out = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        out.push(frame.clone());
    }
    out
}

fn encode_at(order: &[u32]) -> Vec<u8> {
    let frames = frames();
    let mut p = Pipeline::new();
    p.set(Delay(4));
    p.start(Vec::new(), W, H).unwrap();
    for &i in order {
        p.submit_at(i, &frames[i as usize]).unwrap();
    }
    p.finish().unwrap();
    p.run_to_end().unwrap();
    p.into_inner().unwrap()
}

#[test]
fn single_frame_decodes() {
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    assert_eq!(p.submit(&solid([255, 0, 0])).unwrap(), 0);
    p.finish().unwrap();
    assert_eq!(p.poll(), Poll::FrameWritten);
    assert_eq!(p.poll(), Poll::StreamComplete);
    let data = p.into_inner().unwrap();
    assert_eq!(*data.last().unwrap(), 0x3B);

    let decoded = decode(&data);
    assert_eq!(decoded.len(), 1);
    assert_eq!((decoded[0].width, decoded[0].height), (W, H));
    for px in decoded[0].buffer.chunks(4) {
        assert_eq!(px, &[255, 0, 0, 255]);
    }
}

#[test]
fn out_of_order_submission_matches_in_order() {
    let in_order = encode_at(&[0, 1, 2]);
    assert_eq!(encode_at(&[2, 0, 1]), in_order);
    assert_eq!(encode_at(&[1, 2, 0]), in_order);
    assert_eq!(decode(&in_order).len(), 3);
}

#[test]
fn waits_for_missing_frame() {
    let frames = frames();
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    p.submit_at(1, &frames[1]).unwrap();
    assert_eq!(p.poll(), Poll::Waiting);
    p.submit_at(0, &frames[0]).unwrap();
    assert_eq!(p.poll(), Poll::FrameWritten);
    assert_eq!(p.poll(), Poll::FrameWritten);
    assert_eq!(p.written(), 2);
    assert_eq!(p.poll(), Poll::Waiting);
    p.finish().unwrap();
    assert_eq!(p.poll(), Poll::StreamComplete);
}

#[test]
fn duplicate_index_fails() {
    let frames = frames();
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    p.submit_at(0, &frames[0]).unwrap();
    p.submit_at(0, &frames[1]).unwrap();
    assert_eq!(p.poll(), Poll::Failed);
    assert!(matches!(p.take_error(), Some(EncodingError::OrderingViolation(_))));
    assert_eq!(p.state(), State::Failed);
    assert!(p.into_inner().is_none());
}

#[test]
fn gap_at_finish_fails() {
    let frames = frames();
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    p.submit_at(0, &frames[0]).unwrap();
    p.submit_at(2, &frames[2]).unwrap();
    p.finish().unwrap();
    assert_eq!(p.poll(), Poll::FrameWritten);
    assert_eq!(p.poll(), Poll::Failed);
    assert!(matches!(p.take_error(), Some(EncodingError::OrderingViolation(_))));
}

#[test]
fn submit_after_finish_is_rejected() {
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    p.finish().unwrap();
    assert!(matches!(
        p.submit(&solid([0, 0, 0])),
        Err(EncodingError::OrderingViolation(_))
    ));
    assert_eq!(p.poll(), Poll::StreamComplete);
    let data = p.into_inner().unwrap();
    assert_eq!(&data[..6], b"GIF89a");
    assert_eq!(&data[6..], &[W as u8, 0, H as u8, 0, 0, 0, 0, 0x3B]);
}

#[test]
fn abort_is_idempotent() {
    let p: Pipeline<Vec<u8>> = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    p.submit(&solid([1, 2, 3])).unwrap();
    p.abort();
    p.abort();
    assert_eq!(p.state(), State::Failed);
    assert_eq!(p.poll(), Poll::Failed);
    assert!(matches!(p.submit(&solid([1, 2, 3])), Err(EncodingError::NotStarted)));
    assert!(matches!(p.finish(), Err(EncodingError::NotStarted)));
    assert!(p.take_error().is_none());

    // a failed pipeline can be reused
    p.start(Vec::new(), W, H).unwrap();
    p.submit(&solid([1, 2, 3])).unwrap();
    p.finish().unwrap();
    p.run_to_end().unwrap();
    assert_eq!(decode(&p.into_inner().unwrap()).len(), 1);
}

#[test]
fn cancellation_fails_the_stream() {
    let p: Pipeline<Vec<u8>> = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    let token = p.cancellation();
    token.cancel();
    assert_eq!(p.submit(&solid([9, 9, 9])).unwrap(), 0);
    assert_eq!(p.poll(), Poll::Failed);
    assert!(matches!(p.take_error(), Some(EncodingError::Cancelled)));
    assert!(matches!(p.run_to_end(), Err(EncodingError::NotStarted)));
}

struct Broken {
    budget: usize,
}

impl Write for Broken {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.budget {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.budget -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_error_fails_the_stream() {
    let p = Pipeline::new();
    p.start(Broken { budget: 64 }, W, H).unwrap();
    p.submit(&solid([200, 100, 0])).unwrap();
    p.finish().unwrap();
    assert_eq!(p.poll(), Poll::Failed);
    match p.take_error() {
        Some(EncodingError::Io(err)) => assert_eq!(err.to_string(), "disk full"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn parallel_producers() {
    let frames: Vec<Vec<u8>> = (0..12u8).map(|i| solid([i * 20, 255 - i * 20, i])).collect();
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    thread::scope(|s| {
        for (i, pixels) in frames.iter().enumerate().rev() {
            let p = &p;
            s.spawn(move || p.submit_at(i as u32, pixels).unwrap());
        }
    });
    p.finish().unwrap();
    p.run_to_end().unwrap();
    let decoded = decode(&p.into_inner().unwrap());
    assert_eq!(decoded.len(), 12);
    for (frame, pixels) in decoded.iter().zip(frames.iter()) {
        let want = &pixels[..3];
        let got = &frame.buffer[..3];
        for c in 0..3 {
            assert!((want[c] as i32 - got[c] as i32).abs() <= 8);
        }
    }
}

#[test]
fn spawned_and_batched_frames() {
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    let shared: Arc<[u8]> = solid([10, 20, 30]).into();
    assert_eq!(p.spawn(shared.clone()).unwrap(), 0);
    assert_eq!(p.spawn(shared).unwrap(), 1);
    assert_eq!(p.submit_batch(&frames()).unwrap(), 2..5);
    p.finish().unwrap();
    p.run_to_end().unwrap();
    assert_eq!(p.written(), 5);
    assert_eq!(decode(&p.into_inner().unwrap()).len(), 5);
}

#[test]
fn frame_settings_are_written() {
    let mut p = Pipeline::new();
    p.set(Repeat::Finite(2))
        .set(Delay(7))
        .set(Transparent(Some([255, 255, 255])));
    p.start(Vec::new(), W, H).unwrap();
    p.submit(&solid([255, 255, 255])).unwrap();
    p.set(DisposalMethod::Keep);
    p.submit(&solid([0, 0, 0])).unwrap();
    p.finish().unwrap();
    p.run_to_end().unwrap();
    let data = p.into_inner().unwrap();

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(&*data).unwrap();
    assert_eq!(decoder.repeat(), gif::Repeat::Finite(2));
    let first = decoder.read_next_frame().unwrap().unwrap().clone();
    assert_eq!(first.delay, 7);
    assert_eq!(first.dispose, gif::DisposalMethod::Background);
    assert_eq!(first.transparent, Some(first.buffer[0]));
    let second = decoder.read_next_frame().unwrap().unwrap().clone();
    assert_eq!(second.dispose, gif::DisposalMethod::Keep);
    assert!(second.palette.is_some());
}

#[test]
fn memory_stream_saved_to_file() {
    let path = std::env::temp_dir().join(format!("neugif-{}.gif", std::process::id()));
    let p = Pipeline::new();
    p.start_memory(W, H).unwrap();
    p.submit(&solid([0, 128, 255])).unwrap();
    p.finish_to_file(&path).unwrap();
    p.run_to_end().unwrap();
    let saved = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(saved, p.take_output().unwrap());
}

#[test]
fn file_stream() {
    let path = std::env::temp_dir().join(format!("neugif-file-{}.gif", std::process::id()));
    let p = Pipeline::new();
    p.start_file(&path, W, H).unwrap();
    p.submit(&solid([0, 0, 0])).unwrap();
    p.finish().unwrap();
    p.run_to_end().unwrap();
    drop(p.into_inner());
    let saved = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(decode(&saved).len(), 1);
}

#[test]
fn cancel_while_worker_runs() {
    let (w, h) = (512u16, 512u16);
    let pixels: Vec<u8> = (0..w as usize * h as usize * 3).map(|i| (i % 253) as u8).collect();
    let mut p = Pipeline::new();
    p.set(Quality(1));
    p.start(Vec::new(), w, h).unwrap();
    p.spawn(pixels).unwrap();
    assert_eq!(p.poll(), Poll::Waiting);
    p.cancel();

    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        match p.poll() {
            Poll::Waiting => {
                assert!(Instant::now() < deadline, "cancelled worker never failed");
                thread::yield_now();
            }
            Poll::Failed => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(matches!(p.take_error(), Some(EncodingError::Cancelled)));
    assert_eq!(p.state(), State::Failed);
}

#[test]
fn poll_alongside_producers() {
    let frames: Vec<Vec<u8>> = (0..6u8).map(|i| solid([i * 40, 0, 255 - i * 40])).collect();
    let p = Pipeline::new();
    p.start(Vec::new(), W, H).unwrap();
    let mut written = 0;
    thread::scope(|s| {
        s.spawn(|| {
            for i in (0..6u32).rev() {
                p.spawn_at(i, frames[i as usize].clone()).unwrap();
                thread::yield_now();
            }
            p.finish().unwrap();
        });
        let deadline = Instant::now() + Duration::from_secs(60);
        loop {
            match p.poll() {
                Poll::FrameWritten => written += 1,
                Poll::Waiting => {
                    assert!(Instant::now() < deadline, "stream never completed");
                    thread::yield_now();
                }
                Poll::StreamComplete => break,
                Poll::Failed => panic!("stream failed: {:?}", p.take_error()),
            }
        }
    });
    assert_eq!(written, 6);
    assert_eq!(decode(&p.into_inner().unwrap()).len(), 6);
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Compress for Counting {
    fn compress(&self, width: u16, height: u16, indices: &[u8], bit_depth: u8) -> io::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Lzw.compress(width, height, indices, bit_depth)
    }
}

#[test]
fn custom_settings_and_compressor() {
    let mut settings = Settings::default();
    settings.set(Delay(12)).set(Quality(5));
    let calls = Arc::new(AtomicUsize::new(0));
    let p = Pipeline::with_settings(settings.clone()).with_compressor(Counting {
        calls: calls.clone(),
    });
    assert_eq!(p.settings(), &settings);
    assert_eq!(p.settings().sample(), 5);

    p.start(Vec::new(), W, H).unwrap();
    p.submit(&solid([5, 5, 5])).unwrap();
    p.submit(&solid([250, 5, 5])).unwrap();
    p.finish().unwrap();
    p.run_to_end().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let decoded = decode(&p.into_inner().unwrap());
    assert_eq!(decoded.len(), 2);
    assert!(decoded.iter().all(|f| f.delay == 12));
}
