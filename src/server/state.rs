use crate::convert::ConversionPipeline;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    pipeline: ConversionPipeline,
}

impl AppState {
    pub fn new(pipeline: ConversionPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }
}
