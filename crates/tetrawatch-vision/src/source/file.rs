use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use image::RgbImage;
use tracing::{debug, trace};

use crate::frame::{CaptureFault, Frame};

use super::{FrameSource, SequenceCounter};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

enum FileEntry {
    Path(PathBuf),
    Image(RgbImage),
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Image(image) => write!(f, "Image({}x{})", image.width(), image.height()),
        }
    }
}

/// Replays image files or in-memory images as frames.
///
/// Once every entry has been played the source reports
/// [`CaptureFault::Disconnected`], unless it loops.
#[derive(Debug)]
pub struct FileSource {
    entries: Vec<FileEntry>,
    cursor: usize,
    looping: bool,
    sequence: SequenceCounter,
}

impl FileSource {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::from_entries(paths.into_iter().map(|p| FileEntry::Path(p.into())).collect())
    }

    /// Plays every image file of `dir` in file name order.
    pub fn from_dir(dir: &Path) -> Result<Self, CaptureFault> {
        let unavailable = |e: std::io::Error| CaptureFault::Unavailable {
            reason: format!("cannot read {}: {e}", dir.display()),
        };
        let mut paths = fs::read_dir(dir)
            .map_err(unavailable)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        paths.retain(|path| is_image_file(path));
        paths.sort();
        debug!(dir = %dir.display(), files = paths.len(), "replaying image directory");
        Ok(Self::from_paths(paths))
    }

    pub fn from_images<I>(images: I) -> Self
    where
        I: IntoIterator<Item = RgbImage>,
    {
        Self::from_entries(images.into_iter().map(FileEntry::Image).collect())
    }

    fn from_entries(entries: Vec<FileEntry>) -> Self {
        Self {
            entries,
            cursor: 0,
            looping: false,
            sequence: SequenceCounter::default(),
        }
    }

    /// Restarts from the first entry instead of disconnecting at the end.
    #[must_use]
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        if self.cursor >= self.entries.len() {
            if !self.looping || self.entries.is_empty() {
                return Err(CaptureFault::Disconnected);
            }
            self.cursor = 0;
        }
        let entry = &self.entries[self.cursor];
        self.cursor += 1;

        let sequence = self.sequence.next();
        let frame = match entry {
            FileEntry::Path(path) => {
                trace!(path = %path.display(), sequence, "decoding frame");
                let image = image::open(path)
                    .map_err(|source| CaptureFault::Decode {
                        path: path.clone(),
                        source,
                    })?
                    .to_rgb8();
                Frame::from_rgb_image(&image, sequence)?
            }
            FileEntry::Image(image) => Frame::from_rgb_image(image, sequence)?,
        };
        Ok(Some(frame))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_in_memory_replay() {
        let images = [10, 20].map(|v| RgbImage::from_pixel(3, 2, Rgb([v, v, v])));
        let mut source = FileSource::from_images(images);
        let timeout = Duration::ZERO;

        let first = source.next_frame(timeout).unwrap().unwrap();
        let second = source.next_frame(timeout).unwrap().unwrap();
        assert_eq!((first.sequence(), second.sequence()), (0, 1));
        assert_eq!(second.rgb(2, 1), [20, 20, 20]);
        assert!(matches!(
            source.next_frame(timeout),
            Err(CaptureFault::Disconnected)
        ));
    }

    #[test]
    fn test_looping_replay_keeps_numbering() {
        let mut source =
            FileSource::from_images([RgbImage::new(1, 1)]).looping(true);
        for expected in 0..3 {
            let frame = source.next_frame(Duration::ZERO).unwrap().unwrap();
            assert_eq!(frame.sequence(), expected);
        }
    }

    #[test]
    fn test_missing_file_is_a_decode_fault() {
        let mut source = FileSource::from_paths(["/nonexistent/frame.png"]);
        assert!(matches!(
            source.next_frame(Duration::ZERO),
            Err(CaptureFault::Decode { .. })
        ));
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_file(Path::new("a/0001.PNG")));
        assert!(is_image_file(Path::new("frame.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("png")));
    }
}
