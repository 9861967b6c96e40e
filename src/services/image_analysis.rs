// src/services/image_analysis.rs
use std::{fmt::Debug, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::services::{
    image::ImageSource,
    metrics_manager::{MetricEvent, MetricsManager},
    model_client::{Modality, RemoteModelClient},
};

pub const ANALYSIS_ERROR_MESSAGE: &str = "Failed to analyze image. Please try again.";

/// Current analysis state. `result` and `error` are never both set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub result: Option<String>,
    pub error: Option<String>,
    pub pending: bool,
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct AnalysisState {
    result: Option<String>,
    error: Option<String>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

impl AnalysisState {
    fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            result: self.result.clone(),
            error: self.error.clone(),
            pending: self.in_flight.is_some(),
        }
    }
}

/// Holds the latest analysis for one caller. A new request supersedes and
/// cancels whatever is still running.
#[derive(Clone)]
pub struct ImageAnalysisService {
    state: Arc<Mutex<AnalysisState>>,
    model: Arc<RemoteModelClient>,
    metrics: MetricsManager,
}

impl Debug for ImageAnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAnalysisService").finish_non_exhaustive()
    }
}

impl ImageAnalysisService {
    pub fn new(model: Arc<RemoteModelClient>, metrics: MetricsManager) -> Self {
        Self {
            state: Arc::new(Mutex::new(AnalysisState::default())),
            model,
            metrics,
        }
    }

    pub async fn snapshot(&self) -> AnalysisSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Runs one analysis and returns the state it settled into. If another
    /// call superseded this one meanwhile, the returned snapshot is the newer
    /// call's state.
    pub async fn analyze(&self, source: ImageSource) -> AnalysisSnapshot {
        self.analyze_with(source, None).await
    }

    /// [`analyze`](Self::analyze) with a modality-specific instruction.
    pub async fn analyze_with(
        &self,
        source: ImageSource,
        modality: Option<Modality>,
    ) -> AnalysisSnapshot {
        let (id, token) = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.in_flight.take() {
                debug!(id = previous.id, "superseding pending analysis");
                previous.token.cancel();
            }
            state.next_id += 1;
            let id = state.next_id;
            let token = CancellationToken::new();
            state.in_flight = Some(InFlight { id, token: token.clone() });
            state.error = None;
            (id, token)
        };

        let service = self.clone();
        let task = tokio::spawn(async move { service.run(id, token, source, modality).await });
        if let Err(e) = task.await {
            error!(error = %e, "analysis task aborted");
            let mut state = self.state.lock().await;
            if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
                state.in_flight = None;
                state.result = None;
                state.error = Some(ANALYSIS_ERROR_MESSAGE.to_string());
            }
        }
        self.snapshot().await
    }

    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.in_flight.take() {
            Some(in_flight) => {
                in_flight.token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run(
        self,
        id: u64,
        token: CancellationToken,
        source: ImageSource,
        modality: Option<Modality>,
    ) {
        let work = async {
            let data_url = source.read_data_url().await.map_err(|e| {
                warn!(error = %e, "could not read uploaded image");
                e.to_string()
            })?;
            let text = self.model.analyze_image_as(&data_url, modality).await.map_err(|e| {
                warn!(error = %e, "image analysis failed");
                e.to_string()
            })?;
            Ok::<_, String>(text)
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => return,
            outcome = work => outcome,
        };

        let mut state = self.state.lock().await;
        if !state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            debug!(id, "discarding stale analysis outcome");
            return;
        }
        state.in_flight = None;
        let event = match outcome {
            Ok(text) => {
                state.result = Some(text);
                state.error = None;
                MetricEvent::AnalysisCompleted
            }
            Err(_) => {
                state.result = None;
                state.error = Some(ANALYSIS_ERROR_MESSAGE.to_string());
                MetricEvent::AnalysisFailed
            }
        };
        drop(state);
        self.metrics.record(event).await;
    }
}
