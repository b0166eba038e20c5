//! Scripted camera backend.
//!
//! Generates synthetic BGR frames and fails on demand, so the engine's
//! recovery behavior can be exercised without hardware. Scripts are
//! consumed in order; once a script is empty the device behaves.

use super::{CaptureBackend, DeviceError, DeviceHandle, PixelFormat, RawFrame};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Outcome of one scripted `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStep {
    Succeed,
    Fail,
    /// Acquisition succeeds but the handle reports closed right away.
    ReportClosed,
}

/// Outcome of one scripted `read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    Frame,
    Fail,
    /// The device drops off the bus: this read fails and the handle
    /// reports closed from now on.
    Disconnect,
    /// Returns a frame whose buffer does not match its dimensions.
    Corrupt,
    /// The driver call panics.
    Panic,
}

#[derive(Debug, Default)]
struct MockState {
    open_script: Mutex<VecDeque<OpenStep>>,
    read_script: Mutex<VecDeque<ReadStep>>,
    fail_open_forever: AtomicBool,
    reject_resolution: AtomicBool,
    fail_release: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    opens: AtomicUsize,
    successful_opens: AtomicUsize,
    reads: AtomicUsize,
    releases: AtomicUsize,
    live_handles: AtomicUsize,
    max_live_handles: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Backend producing scripted mock devices.
///
/// Cloning shares the script and call counters.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` opens.
    pub fn fail_opens(self, count: usize) -> Self {
        self.push_opens(std::iter::repeat(OpenStep::Fail).take(count))
    }

    /// Fails every open not covered by the open script.
    pub fn fail_open_forever(self) -> Self {
        self.state.fail_open_forever.store(true, Ordering::SeqCst);
        self
    }

    /// Appends steps to the open script.
    pub fn push_opens(self, steps: impl IntoIterator<Item = OpenStep>) -> Self {
        lock(&self.state.open_script).extend(steps);
        self
    }

    /// Appends steps to the read script.
    pub fn push_reads(self, steps: impl IntoIterator<Item = ReadStep>) -> Self {
        lock(&self.state.read_script).extend(steps);
        self
    }

    /// Makes `set_resolution` fail, leaving the default 640x480.
    pub fn reject_resolution(self) -> Self {
        self.state.reject_resolution.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every `release` report an error.
    pub fn fail_release(self) -> Self {
        self.state.fail_release.store(true, Ordering::SeqCst);
        self
    }

    /// Sleeps in every read, simulating a slow driver.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        *lock(&self.state.read_delay) = Some(delay);
        self
    }

    /// Switches opens to always fail from now on.
    pub fn set_fail_open_forever(&self, fail: bool) {
        self.state.fail_open_forever.store(fail, Ordering::SeqCst);
    }

    /// Total open calls, successful or not.
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn successful_opens(&self) -> usize {
        self.state.successful_opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Handles acquired and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live handles observed.
    pub fn max_live_handles(&self) -> usize {
        self.state.max_live_handles.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for MockBackend {
    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let step = lock(&self.state.open_script).pop_front();
        let step = match step {
            Some(step) => step,
            None if self.state.fail_open_forever.load(Ordering::SeqCst) => OpenStep::Fail,
            None => OpenStep::Succeed,
        };

        if step == OpenStep::Fail {
            return Err(DeviceError::OpenFailed(format!(
                "mock device {} unavailable",
                index
            )));
        }

        self.state.successful_opens.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live_handles.fetch_max(live, Ordering::SeqCst);
        tracing::debug!(index, "MockCamera opened");

        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            width: 640,
            height: 480,
            open: step == OpenStep::Succeed,
            released: false,
            sequence: 0,
        }))
    }
}

/// A mock device handle.
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<MockState>,
    width: u32,
    height: u32,
    open: bool,
    released: bool,
    sequence: u64,
}

impl MockHandle {
    fn synthetic_frame(&mut self) -> RawFrame {
        let pixel_count = (self.width * self.height) as usize;
        let sequence = self.sequence;
        // Deterministic gradient shifted by sequence, BGR order.
        let data: Vec<u8> = (0..pixel_count)
            .flat_map(|i| {
                let v = (i as u64 ^ sequence) as u8;
                [v, v.wrapping_add(85), v.wrapping_add(170)]
            })
            .collect();
        self.sequence += 1;
        RawFrame::new(data, self.width, self.height, PixelFormat::Bgr)
    }
}

impl DeviceHandle for MockHandle {
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        if self.state.reject_resolution.load(Ordering::SeqCst) {
            return Err(DeviceError::ConfigureFailed(format!(
                "{}x{} not supported",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && !self.released
    }

    fn read(&mut self) -> Result<RawFrame, DeviceError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.state.read_delay);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if !self.is_open() {
            return Err(DeviceError::NotOpen);
        }

        let step = lock(&self.state.read_script)
            .pop_front()
            .unwrap_or(ReadStep::Frame);

        match step {
            ReadStep::Frame => Ok(self.synthetic_frame()),
            ReadStep::Fail => Err(DeviceError::ReadFailed("no frame".into())),
            ReadStep::Disconnect => {
                self.open = false;
                Err(DeviceError::ReadFailed("device disconnected".into()))
            }
            ReadStep::Corrupt => Ok(RawFrame::new(
                vec![0u8; 10],
                self.width,
                self.height,
                PixelFormat::Bgr,
            )),
            ReadStep::Panic => panic!("mock driver fault"),
        }
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        if !self.released {
            self.released = true;
            self.state.releases.fetch_add(1, Ordering::SeqCst);
            self.state.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
        if self.state.fail_release.load(Ordering::SeqCst) {
            return Err(DeviceError::ReleaseFailed("mock release error".into()));
        }
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        // A handle lost to a panicking read still frees its slot.
        if !self.released {
            self.released = true;
            self.state.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let backend = MockBackend::new();
        let mut handle = backend.open(0).unwrap();
        assert!(handle.is_open());
        assert_eq!(backend.live_handles(), 1);

        handle.set_resolution(4, 2).unwrap();
        let frame = handle.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(frame.data().len(), 4 * 2 * 3);
        assert_eq!(frame.format(), PixelFormat::Bgr);

        handle.release().unwrap();
        assert!(!handle.is_open());
        assert_eq!(backend.releases(), 1);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_open_script_then_default() {
        let backend = MockBackend::new().fail_opens(2);
        assert!(backend.open(0).is_err());
        assert!(backend.open(0).is_err());
        assert!(backend.open(0).is_ok());
        assert_eq!(backend.opens(), 3);
        assert_eq!(backend.successful_opens(), 1);
    }

    #[test]
    fn test_disconnect_closes_handle() {
        let backend = MockBackend::new().push_reads([ReadStep::Frame, ReadStep::Disconnect]);
        let mut handle = backend.open(0).unwrap();
        assert!(handle.read().is_ok());
        assert!(handle.read().is_err());
        assert!(!handle.is_open());
        assert!(matches!(handle.read(), Err(DeviceError::NotOpen)));
    }

    #[test]
    fn test_rejected_resolution_keeps_default() {
        let backend = MockBackend::new().reject_resolution();
        let mut handle = backend.open(0).unwrap();
        assert!(handle.set_resolution(1920, 1080).is_err());
        let frame = handle.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
    }

    #[test]
    fn test_drop_frees_live_slot() {
        let backend = MockBackend::new();
        let handle = backend.open(0).unwrap();
        drop(handle);
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(backend.releases(), 0);
    }
}
