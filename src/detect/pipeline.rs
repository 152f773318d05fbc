use tracing::debug;

use crate::config::DetectorConfig;
use crate::detect::alarm::SustainAlarm;
use crate::detect::ensemble::EnsembleScorer;
use crate::detect::threshold::PercentileThreshold;
use crate::detect::window::SlidingWindow;
use crate::detect::{DetectError, DetectionResult, ExceedPolicy, FeatureVector};
use crate::telemetry::MetricSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Window not yet full; no results are produced.
    WarmingUp,
    /// Window full; every sample yields a result.
    Active,
}

/// Per-session detector: window, ensemble, adaptive threshold and alarm.
///
/// Not shared between sessions; every instance owns its buffers.
pub struct DetectionPipeline {
    window: SlidingWindow,
    scorer: EnsembleScorer,
    threshold: PercentileThreshold,
    alarm: SustainAlarm,
    threshold_pct: f64,
    exceed_policy: ExceedPolicy,
    dims: Option<usize>,
    state: PipelineState,
}

impl DetectionPipeline {
    pub fn new(config: &DetectorConfig, scorer: EnsembleScorer) -> Result<Self, DetectError> {
        if config.window < 2 {
            return Err(DetectError::WindowTooSmall {
                window: config.window,
            });
        }
        if config.baseline == 0 {
            return Err(DetectError::EmptyBaseline);
        }
        if !(0.0..=100.0).contains(&config.threshold_pct) {
            return Err(DetectError::InvalidPercentile(config.threshold_pct));
        }
        let alarm = SustainAlarm::new(config.sustain_window, config.sustain)?;

        Ok(Self {
            window: SlidingWindow::new(config.window),
            scorer,
            threshold: PercentileThreshold::new(config.baseline),
            alarm,
            threshold_pct: config.threshold_pct,
            exceed_policy: config.exceed,
            dims: None,
            state: PipelineState::WarmingUp,
        })
    }

    /// Pipeline backed by the built-in ECOD and isolation forest models.
    pub fn with_default_models(config: &DetectorConfig) -> Result<Self, DetectError> {
        Self::new(config, EnsembleScorer::with_default_models(config.ensemble))
    }

    /// Run one telemetry sample through the pipeline.
    pub fn process(
        &mut self,
        snapshot: &MetricSnapshot,
    ) -> Result<Option<DetectionResult>, DetectError> {
        self.process_features(snapshot.features())
    }

    /// Run one feature vector through the pipeline.
    ///
    /// Returns `Ok(None)` while warming up. A scoring error leaves threshold
    /// and alarm history untouched; the next sample is attempted afresh.
    pub fn process_features(
        &mut self,
        features: FeatureVector,
    ) -> Result<Option<DetectionResult>, DetectError> {
        match self.dims {
            Some(expected) if expected != features.len() => {
                return Err(DetectError::DimensionMismatch {
                    expected,
                    got: features.len(),
                });
            }
            Some(_) => {}
            None => self.dims = Some(features.len()),
        }

        self.window.push(features);
        if !self.window.is_ready() {
            return Ok(None);
        }
        if self.state == PipelineState::WarmingUp {
            debug!(window = self.window.capacity(), "window full, detection active");
            self.state = PipelineState::Active;
        }

        let score = self.scorer.score_latest(&self.window.as_matrix())?;

        // Judge against history that excludes this sample, then record it.
        let threshold = self.threshold.percentile(self.threshold_pct);
        let exceed = self.exceed_policy.exceeds(score.combined, threshold);
        self.threshold.update(score.combined);
        let alarm = self.alarm.update(exceed);

        Ok(Some(DetectionResult {
            score_ecod: score.ecod,
            score_iforest: score.iforest,
            score_ens: score.combined,
            threshold,
            exceed,
            alarm,
        }))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn score_history_len(&self) -> usize {
        self.threshold.len()
    }

    pub fn alarm_history_len(&self) -> usize {
        self.alarm.len()
    }

    /// Threshold the next sample would be judged against.
    pub fn current_threshold(&self) -> f64 {
        self.threshold.percentile(self.threshold_pct)
    }
}
