use crate::pipeline::PipelineContext;

/// Shared by every request; the OCR engine inside is started once.
pub(crate) struct ServerState {
    pub(crate) pipeline: PipelineContext,
}
