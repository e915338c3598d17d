use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tetrawatch_engine::{GameState, Piece};
use tetrawatch_evaluator::predictor::{MovePredictor, PlacementCandidate};
use tracing::{debug, trace, warn};

/// Ranks the placements for `state`: its active piece, looking ahead to the first
/// preview piece.
pub(crate) fn rank(predictor: &MovePredictor, state: &GameState) -> Vec<PlacementCandidate> {
    predictor.predict(
        state.grid(),
        state.active().map(Piece::kind),
        state.next_pieces().first().copied(),
    )
}

#[derive(Debug)]
struct Response {
    version: u64,
    candidates: Vec<PlacementCandidate>,
}

/// Move prediction on a dedicated thread.
///
/// At most one request waits for the worker; a newer state simply waits for the next
/// frame if the slot is taken.
#[derive(Debug)]
pub struct PredictionWorker {
    requests: Option<SyncSender<Arc<GameState>>>,
    responses: Receiver<Response>,
    pending: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl PredictionWorker {
    #[must_use]
    pub fn spawn(predictor: MovePredictor) -> Self {
        let (tx_request, rx_request) = mpsc::sync_channel::<Arc<GameState>>(1);
        let (tx_response, rx_response) = mpsc::channel();
        let handle = thread::spawn(move || {
            while let Ok(state) = rx_request.recv() {
                let candidates = rank(&predictor, &state);
                let response = Response {
                    version: state.version(),
                    candidates,
                };
                if tx_response.send(response).is_err() {
                    break;
                }
            }
            debug!("prediction worker finished");
        });
        Self {
            requests: Some(tx_request),
            responses: rx_response,
            pending: None,
            handle: Some(handle),
        }
    }

    /// Candidates for `state`, or `None` if the worker did not answer within `timeout`.
    pub fn predict(
        &mut self,
        state: &Arc<GameState>,
        timeout: Duration,
    ) -> Option<Vec<PlacementCandidate>> {
        let version = state.version();
        if self.pending != Some(version) {
            let requests = self.requests.as_ref()?;
            match requests.try_send(Arc::clone(state)) {
                Ok(()) => self.pending = Some(version),
                Err(TrySendError::Full(_)) => trace!(version, "prediction worker busy"),
                Err(TrySendError::Disconnected(_)) => {
                    warn!("prediction worker is gone");
                    return None;
                }
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.version == version => {
                    self.pending = None;
                    return Some(response.candidates);
                }
                Ok(response) => {
                    trace!(version = response.version, "stale prediction discarded");
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(version, ?timeout, "prediction timed out");
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for PredictionWorker {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("prediction worker panicked");
        }
    }
}
