use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, trace};

use crate::frame::{CaptureFault, Frame};

use super::FrameSource;

const CAPTURE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// Single-item handoff where a new value replaces an unconsumed one.
#[derive(Debug)]
pub struct DropOldestSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
    overwritten: AtomicU64,
}

impl<T> Default for DropOldestSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            ready: Condvar::new(),
            overwritten: AtomicU64::new(0),
        }
    }
}

impl<T> DropOldestSlot<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, returning `true` if an unconsumed value was discarded.
    pub fn put(&self, value: T) -> bool {
        let replaced = self.lock().value.replace(value).is_some();
        if replaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        replaced
    }

    /// Waits up to `timeout` for a value.
    ///
    /// Returns `Err(())` once the slot is closed and drained.
    #[expect(clippy::result_unit_err)]
    pub fn take(&self, timeout: Duration) -> Result<Option<T>, ()> {
        let guard = self.lock();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |s| s.value.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        match guard.value.take() {
            Some(value) => Ok(Some(value)),
            None if guard.closed => Err(()),
            None => Ok(None),
        }
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Number of values replaced before being taken.
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

/// Runs another source on a capture thread.
///
/// Frames are handed over through a [`DropOldestSlot`], so a slow consumer always sees the
/// most recent frame and never a backlog.
#[derive(Debug)]
pub struct ThreadedSource {
    slot: Arc<DropOldestSlot<Result<Frame, CaptureFault>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedSource {
    pub fn spawn<S>(mut source: S) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let slot = Arc::new(DropOldestSlot::default());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match source.next_frame(CAPTURE_POLL) {
                        Ok(Some(frame)) => {
                            if slot.put(Ok(frame)) {
                                trace!("capture overwrote an unconsumed frame");
                            }
                        }
                        Ok(None) => {}
                        Err(fault) => {
                            let terminal = fault.is_terminal();
                            slot.put(Err(fault));
                            if terminal {
                                break;
                            }
                        }
                    }
                }
                slot.close();
                debug!("capture thread finished");
            })
        };
        Self {
            slot,
            stop,
            handle: Some(handle),
        }
    }

    /// Frames (or faults) discarded because the consumer had not taken the previous one.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.slot.overwritten()
    }

    /// Stops the capture thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl FrameSource for ThreadedSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        match self.slot.take(timeout) {
            Ok(Some(result)) => result.map(Some),
            Ok(None) => Ok(None),
            Err(()) => Err(CaptureFault::Disconnected),
        }
    }
}

impl Drop for ThreadedSource {
    fn drop(&mut self) {
        self.stop();
    }
}
