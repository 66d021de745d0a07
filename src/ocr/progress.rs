use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Preparing,
    LoadingEngine,
    Recognizing,
    Processing,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: u8,
}

/// Sending half of the recognition progress stream. A reporter without a
/// subscriber drops events.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, stage: ProgressStage, percent: u8) {
        let percent = percent.min(100);
        debug!(?stage, percent, "ocr progress");
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent { stage, percent });
        }
    }

    /// Maps engine progress in `[0, 1]` onto the 30..=90 band.
    pub fn recognizing(&self, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 60.0).round() as u8 + 30;
        self.emit(ProgressStage::Recognizing, percent);
    }
}
