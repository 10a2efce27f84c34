//! Detector contract and a line-delimited JSON detection source.
//!
//! The face/landmark model itself lives outside this crate. Anything that
//! can produce one [`Frame`] (or nothing) per call can drive a session.

use crate::types::Frame;
use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection stream ended")]
    StreamEnded,
    #[error("malformed detection on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("detection stream read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// A face detector queried once per poll.
///
/// Returns `Ok(None)` when the current frame contains no face. Calls may
/// block; the runner executes them off the async scheduler and never
/// overlaps two calls on the same detector.
pub trait Detector: Send {
    fn detect(&mut self) -> Result<Option<Frame>, DetectorError>;
}

impl<F> Detector for F
where
    F: FnMut() -> Result<Option<Frame>, DetectorError> + Send,
{
    fn detect(&mut self) -> Result<Option<Frame>, DetectorError> {
        self()
    }
}

/// Reads detections as JSON lines: `null` for "no face", otherwise a [`Frame`].
///
/// Blank lines are skipped. Works over files as well as FIFOs fed by an
/// external detector process.
pub struct StreamDetector<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead + Send> StreamDetector<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead + Send> Detector for StreamDetector<R> {
    fn detect(&mut self) -> Result<Option<Frame>, DetectorError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Err(DetectorError::StreamEnded);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str::<Option<Frame>>(line).map_err(|source| {
                DetectorError::Malformed {
                    line: self.line_no,
                    source,
                }
            });
        }
    }
}

type DetectResult = Result<Option<Frame>, DetectorError>;

#[derive(Default)]
struct LatestSlot {
    latest: Option<DetectResult>,
    ended: bool,
}

#[derive(Default)]
struct LatestShared {
    slot: Mutex<LatestSlot>,
    arrived: Condvar,
}

impl LatestShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, LatestSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live detection feed that always answers with the newest line.
///
/// A reader thread drains the source continuously, so a producer writing
/// faster than the poll rate never leaves a backlog of stale frames. Each
/// line is handed out at most once; `detect` blocks until a line newer than
/// the last one arrives. The thread exits at end of stream or on a read error.
pub struct LatestFrameDetector {
    shared: Arc<LatestShared>,
}

impl LatestFrameDetector {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> std::io::Result<Self> {
        let shared = Arc::new(LatestShared::default());
        let feed = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("facegate-detections".into())
            .spawn(move || {
                let mut stream = StreamDetector::new(reader);
                let mut replaced = 0u64;
                loop {
                    let result = stream.detect();
                    let ended = matches!(
                        result,
                        Err(DetectorError::StreamEnded | DetectorError::Io(_))
                    );
                    let mut slot = feed.lock();
                    match result {
                        Err(DetectorError::StreamEnded) => {}
                        result => {
                            if slot.latest.replace(result).is_some() {
                                replaced += 1;
                            }
                        }
                    }
                    slot.ended = ended;
                    drop(slot);
                    feed.arrived.notify_all();
                    if ended {
                        tracing::info!(replaced, "detection feed closed");
                        break;
                    }
                }
            })?;
        Ok(Self { shared })
    }
}

impl Detector for LatestFrameDetector {
    fn detect(&mut self) -> Result<Option<Frame>, DetectorError> {
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = slot.latest.take() {
                return result;
            }
            if slot.ended {
                return Err(DetectorError::StreamEnded);
            }
            slot = self
                .shared
                .arrived
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Replays a fixed sequence of detector results, then reports end of stream.
pub struct ScriptedDetector {
    script: VecDeque<Result<Option<Frame>, DetectorError>>,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Result<Option<Frame>, DetectorError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Script made only of successful results.
    pub fn from_frames(frames: impl IntoIterator<Item = Option<Frame>>) -> Self {
        Self::new(frames.into_iter().map(Ok))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self) -> Result<Option<Frame>, DetectorError> {
        self.script.pop_front().unwrap_or(Err(DetectorError::StreamEnded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{aligned, aligned_tagged};
    use std::io::{Cursor, Read};

    #[test]
    fn test_stream_detector_reads_lines() {
        let frame_json = serde_json::to_string(&aligned()).unwrap();
        let input = format!("null\n\n{frame_json}\n");
        let mut det = StreamDetector::new(Cursor::new(input));

        assert!(det.detect().unwrap().is_none());
        assert_eq!(det.detect().unwrap(), Some(aligned()));
        assert!(matches!(det.detect(), Err(DetectorError::StreamEnded)));
    }

    #[test]
    fn test_stream_detector_reports_line_number() {
        let mut det = StreamDetector::new(Cursor::new("null\n{not json}\nnull\n"));
        det.detect().unwrap();
        match det.detect() {
            Err(DetectorError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed line error, got {other:?}"),
        }
        // The stream keeps going after a bad line.
        assert!(det.detect().unwrap().is_none());
    }

    #[test]
    fn test_scripted_detector_exhausts() {
        let mut det = ScriptedDetector::from_frames([None, Some(aligned())]);
        assert_eq!(det.remaining(), 2);
        assert!(det.detect().unwrap().is_none());
        assert!(det.detect().unwrap().is_some());
        assert!(matches!(det.detect(), Err(DetectorError::StreamEnded)));
    }

    #[test]
    fn test_closure_detector() {
        let mut calls = 0;
        let mut det = move || {
            calls += 1;
            Ok::<_, DetectorError>(if calls % 2 == 0 { Some(aligned()) } else { None })
        };
        assert!(Detector::detect(&mut det).unwrap().is_none());
        assert!(Detector::detect(&mut det).unwrap().is_some());
    }

    fn wait_until_ended(det: &LatestFrameDetector) {
        while !det.shared.lock().ended {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Reader fed line by line from a channel, like a FIFO with a live writer.
    struct ChannelReader {
        lines: std::sync::mpsc::Receiver<String>,
        pending: Cursor<Vec<u8>>,
    }

    impl std::io::Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                let n = self.pending.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                match self.lines.recv() {
                    Ok(line) => self.pending = Cursor::new(format!("{line}\n").into_bytes()),
                    Err(_) => return Ok(0),
                }
            }
        }
    }

    #[test]
    fn test_latest_frame_skips_backlog() {
        let lines: Vec<String> = (1..=5)
            .map(|tag| serde_json::to_string(&aligned_tagged(tag as f32)).unwrap())
            .collect();
        let mut det = LatestFrameDetector::spawn(Cursor::new(lines.join("\n"))).unwrap();
        wait_until_ended(&det);

        let newest = det.detect().unwrap().unwrap();
        assert_eq!(newest.descriptor.values, vec![5.0]);
        assert!(matches!(det.detect(), Err(DetectorError::StreamEnded)));
    }

    #[test]
    fn test_latest_frame_waits_for_next_line() {
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = std::io::BufReader::new(ChannelReader {
            lines: rx,
            pending: Cursor::new(Vec::new()),
        });
        let mut det = LatestFrameDetector::spawn(reader).unwrap();

        tx.send("null".to_string()).unwrap();
        assert!(det.detect().unwrap().is_none());

        let writer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send(serde_json::to_string(&aligned_tagged(7.0)).unwrap())
                .unwrap();
        });
        // Blocks until the writer delivers a line newer than the one already taken.
        let frame = det.detect().unwrap().unwrap();
        assert_eq!(frame.descriptor.values, vec![7.0]);

        writer.join().unwrap();
        assert!(matches!(det.detect(), Err(DetectorError::StreamEnded)));
    }
}

