//! Audio recording
//!
//! A small state machine around an exclusively-owned capture device.
//! Recording is capped at a wall-clock ceiling, and the device is released
//! on every exit path: manual stop, ceiling hit, or a failed start. The
//! machine is driven from the UI tick, so there is no background timer to
//! cancel.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

/// Hard ceiling for one recording session.
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(30);

/// The microphone-side resource. Exclusively owned by one [`Recorder`] for
/// the duration of a session.
pub trait CaptureDevice: Send {
    /// Acquire the device and start producing audio data.
    fn start(&mut self) -> Result<()>;

    /// Next chunk of captured data, if any is ready. Never blocks.
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;

    /// Stop capture and free the device. Must be safe to call twice.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Manual,
    Timeout,
}

#[derive(Debug)]
pub struct FinishedRecording {
    pub data: Vec<u8>,
    pub reason: StopReason,
}

#[derive(Clone, Copy)]
enum RecorderState {
    Idle,
    Recording { started: Instant },
}

pub struct Recorder {
    device: Box<dyn CaptureDevice>,
    state: RecorderState,
    buffer: Vec<u8>,
    max_duration: Duration,
}

impl Recorder {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self::with_max_duration(device, MAX_RECORDING_DURATION)
    }

    /// Ceiling override, used by tests so the timeout path doesn't take 30
    /// real seconds.
    pub fn with_max_duration(device: Box<dyn CaptureDevice>, max_duration: Duration) -> Self {
        Self {
            device,
            state: RecorderState::Idle,
            buffer: Vec::new(),
            max_duration,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self.state {
            RecorderState::Recording { started } => Some(started.elapsed()),
            RecorderState::Idle => None,
        }
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Acquire the device and begin capturing. If the device fails to start
    /// it is released again before the error is returned.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(anyhow!("already recording"));
        }

        if let Err(e) = self.device.start() {
            self.device.release();
            return Err(e);
        }

        self.buffer.clear();
        self.state = RecorderState::Recording {
            started: Instant::now(),
        };
        Ok(())
    }

    /// Drain pending chunks and stop automatically once the ceiling is hit.
    /// Call from the UI tick; returns the finished recording on the tick
    /// that crosses the ceiling.
    pub fn tick(&mut self) -> Option<FinishedRecording> {
        let RecorderState::Recording { started } = self.state else {
            return None;
        };

        while let Some(chunk) = self.device.poll_chunk() {
            self.buffer.extend_from_slice(&chunk);
        }

        if started.elapsed() >= self.max_duration {
            return Some(self.finish(StopReason::Timeout));
        }

        None
    }

    /// Manual stop. Returns the captured data, or `None` when idle.
    pub fn stop(&mut self) -> Option<FinishedRecording> {
        if !self.is_recording() {
            return None;
        }
        Some(self.finish(StopReason::Manual))
    }

    fn finish(&mut self, reason: StopReason) -> FinishedRecording {
        // Pick up anything produced since the last tick before shutting the
        // device down.
        while let Some(chunk) = self.device.poll_chunk() {
            self.buffer.extend_from_slice(&chunk);
        }
        self.device.release();
        self.state = RecorderState::Idle;

        FinishedRecording {
            data: std::mem::take(&mut self.buffer),
            reason,
        }
    }
}

/// Capture device backed by the `arecord` CLI. The child's stdout is drained
/// by a reader thread into a channel so `poll_chunk` never blocks the event
/// loop.
pub struct ArecordCaptureDevice {
    child: Option<Child>,
    chunks: Option<Receiver<Vec<u8>>>,
}

impl ArecordCaptureDevice {
    pub fn new() -> Self {
        Self {
            child: None,
            chunks: None,
        }
    }
}

impl Default for ArecordCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for ArecordCaptureDevice {
    fn start(&mut self) -> Result<()> {
        let mut child = Command::new("arecord")
            .args(["-q", "-f", "cd", "-t", "wav"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("could not start arecord")?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("arecord stdout unavailable"))?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.child = Some(child);
        self.chunks = Some(rx);
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        match self.chunks.as_ref()?.try_recv() {
            Ok(chunk) => Some(chunk),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.chunks = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeDevice {
        chunks: VecDeque<Vec<u8>>,
        fail_start: bool,
        released: Arc<AtomicBool>,
    }

    impl FakeDevice {
        fn new(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let device = Self {
                chunks: chunks.into(),
                fail_start: false,
                released: Arc::clone(&released),
            };
            (device, released)
        }
    }

    impl CaptureDevice for FakeDevice {
        fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(anyhow!("no microphone"));
            }
            Ok(())
        }

        fn poll_chunk(&mut self) -> Option<Vec<u8>> {
            self.chunks.pop_front()
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_manual_stop_collects_data_and_releases() {
        let (device, released) = FakeDevice::new(vec![vec![1, 2], vec![3]]);
        let mut recorder = Recorder::new(Box::new(device));

        recorder.start().unwrap();
        assert!(recorder.is_recording());
        assert!(recorder.tick().is_none());

        let finished = recorder.stop().unwrap();
        assert_eq!(finished.reason, StopReason::Manual);
        assert_eq!(finished.data, vec![1, 2, 3]);
        assert!(released.load(Ordering::SeqCst));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_ceiling_stops_exactly_once_and_releases() {
        let (device, released) = FakeDevice::new(vec![vec![7; 4]]);
        let mut recorder =
            Recorder::with_max_duration(Box::new(device), Duration::from_millis(10));

        recorder.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let finished = recorder.tick().expect("ceiling should stop the session");
        assert_eq!(finished.reason, StopReason::Timeout);
        assert_eq!(finished.data, vec![7; 4]);
        assert!(released.load(Ordering::SeqCst));

        // The session is over; further ticks and stops produce nothing.
        assert!(recorder.tick().is_none());
        assert!(recorder.stop().is_none());
    }

    #[test]
    fn test_failed_start_releases_device() {
        let (mut device, released) = FakeDevice::new(vec![]);
        device.fail_start = true;
        let mut recorder = Recorder::new(Box::new(device));

        assert!(recorder.start().is_err());
        assert!(!recorder.is_recording());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_when_idle_is_none() {
        let (device, _released) = FakeDevice::new(vec![]);
        let mut recorder = Recorder::new(Box::new(device));
        assert!(recorder.stop().is_none());
        assert!(recorder.tick().is_none());
        assert!(recorder.elapsed().is_none());
    }

    #[test]
    fn test_second_session_starts_with_empty_buffer() {
        let (device, _released) = FakeDevice::new(vec![vec![1], vec![2]]);
        let mut recorder = Recorder::new(Box::new(device));

        recorder.start().unwrap();
        let first = recorder.stop().unwrap();
        assert_eq!(first.data, vec![1, 2]);

        recorder.start().unwrap();
        let second = recorder.stop().unwrap();
        assert!(second.data.is_empty());
    }
}
