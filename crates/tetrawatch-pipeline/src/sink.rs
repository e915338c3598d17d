use std::sync::mpsc::{SyncSender, TrySendError};

use tracing::trace;

use crate::session::FrameOutput;

/// Receives the result of every processed frame.
///
/// Emitting never blocks the pipeline and cannot fail; a sink that cannot keep up loses
/// outputs.
pub trait FrameSink {
    fn emit(&mut self, output: FrameOutput);
}

impl<F> FrameSink for F
where
    F: FnMut(FrameOutput),
{
    fn emit(&mut self, output: FrameOutput) {
        self(output);
    }
}

impl FrameSink for SyncSender<FrameOutput> {
    fn emit(&mut self, output: FrameOutput) {
        match self.try_send(output) {
            Ok(()) => {}
            Err(TrySendError::Full(output)) => {
                trace!(sequence = output.sequence, "output channel full, output dropped");
            }
            Err(TrySendError::Disconnected(output)) => {
                trace!(sequence = output.sequence, "output receiver gone, output dropped");
            }
        }
    }
}

impl FrameSink for Vec<FrameOutput> {
    fn emit(&mut self, output: FrameOutput) {
        self.push(output);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use tetrawatch_tracker::Phase;

    use super::*;

    fn output(sequence: u64) -> FrameOutput {
        FrameOutput {
            sequence,
            state: None,
            candidates: Vec::new(),
            hints: Vec::new(),
            phase: Phase::Uninitialized,
            degraded_calibration: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |output: FrameOutput| seen.push(output.sequence);
            sink.emit(output(3));
            sink.emit(output(4));
        }
        assert_eq!(seen, [3, 4]);
    }

    #[test]
    fn test_full_channel_drops_output() {
        let (mut tx, rx) = mpsc::sync_channel(1);
        tx.emit(output(0));
        tx.emit(output(1));
        assert_eq!(rx.try_recv().unwrap().sequence, 0);
        assert!(rx.try_recv().is_err());

        drop(rx);
        tx.emit(output(2));
    }
}
