//! Frame acquisition.
//!
//! Every source implements [`FrameSource`]. The concrete source for a session is chosen
//! once, at construction, as a [`CaptureSource`] variant.

use std::time::Duration;

use crate::frame::{CaptureFault, ChannelLayout, Frame};

pub use self::{file::*, threaded::*};

mod file;
mod threaded;

/// Produces frames on demand.
pub trait FrameSource {
    /// Waits at most `timeout` for the next frame.
    ///
    /// `Ok(None)` means no new frame arrived in time; the caller should simply poll again.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureFault>;
}

impl<S> FrameSource for Box<S>
where
    S: FrameSource + ?Sized,
{
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        (**self).next_frame(timeout)
    }
}

/// Screen area in desktop pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// What an external grabber should capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// A monitor, optionally restricted to a region.
    Screen {
        monitor: usize,
        region: Option<ScreenRegion>,
    },
    /// The client area of the first window whose title contains `title`.
    Window { title: String },
}

/// Pixels handed over by a platform grabber.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
    pub pixels: Vec<u8>,
}

/// Platform screen grabbing, implemented outside this crate.
pub trait Grabber: Send {
    fn grab(&mut self, target: &CaptureTarget) -> Result<RawImage, CaptureFault>;
}

/// Numbers frames in capture order.
#[derive(Debug, Default)]
pub(crate) struct SequenceCounter(u64);

impl SequenceCounter {
    pub(crate) fn next(&mut self) -> u64 {
        let seq = self.0;
        self.0 += 1;
        seq
    }
}

/// Captures through a [`Grabber`] for one fixed target.
pub struct GrabberSource {
    grabber: Box<dyn Grabber>,
    target: CaptureTarget,
    sequence: SequenceCounter,
}

impl std::fmt::Debug for GrabberSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrabberSource")
            .field("target", &self.target)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl GrabberSource {
    #[must_use]
    pub fn new(grabber: Box<dyn Grabber>, target: CaptureTarget) -> Self {
        Self {
            grabber,
            target,
            sequence: SequenceCounter::default(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }
}

impl FrameSource for GrabberSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        let raw = self.grabber.grab(&self.target)?;
        let frame = Frame::new(
            raw.pixels,
            raw.width,
            raw.height,
            raw.layout,
            self.sequence.next(),
        )?;
        Ok(Some(frame))
    }
}

/// Whole-monitor or monitor-region capture.
pub type ScreenSource = GrabberSource;
/// Single-window capture.
pub type WindowSource = GrabberSource;

/// The capture backend of a session.
#[derive(Debug)]
pub enum CaptureSource {
    Screen(ScreenSource),
    Window(WindowSource),
    File(FileSource),
}

impl CaptureSource {
    #[must_use]
    pub fn screen(grabber: Box<dyn Grabber>, monitor: usize, region: Option<ScreenRegion>) -> Self {
        Self::Screen(GrabberSource::new(
            grabber,
            CaptureTarget::Screen { monitor, region },
        ))
    }

    #[must_use]
    pub fn window(grabber: Box<dyn Grabber>, title: impl Into<String>) -> Self {
        Self::Window(GrabberSource::new(
            grabber,
            CaptureTarget::Window {
                title: title.into(),
            },
        ))
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        match self {
            Self::Screen(source) | Self::Window(source) => source.next_frame(timeout),
            Self::File(source) => source.next_frame(timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidGrabber {
        calls: usize,
    }

    impl Grabber for SolidGrabber {
        fn grab(&mut self, target: &CaptureTarget) -> Result<RawImage, CaptureFault> {
            self.calls += 1;
            if self.calls == 2 {
                return Err(CaptureFault::Unavailable {
                    reason: "window minimized".into(),
                });
            }
            let CaptureTarget::Window { title } = target else {
                panic!("unexpected target");
            };
            assert_eq!(title, "Tetris");
            Ok(RawImage {
                width: 2,
                height: 1,
                layout: ChannelLayout::Bgr8,
                pixels: vec![0, 0, 255, 0, 255, 0],
            })
        }
    }

    #[test]
    fn test_window_source_numbers_frames() {
        let mut source = CaptureSource::window(Box::new(SolidGrabber { calls: 0 }), "Tetris");
        let timeout = Duration::from_millis(10);

        let first = source.next_frame(timeout).unwrap().unwrap();
        assert_eq!(first.sequence(), 0);
        assert_eq!(first.rgb(0, 0), [255, 0, 0]);

        assert!(matches!(
            source.next_frame(timeout),
            Err(CaptureFault::Unavailable { .. })
        ));

        let third = source.next_frame(timeout).unwrap().unwrap();
        assert_eq!(third.sequence(), 1);
    }
}
