use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::ParkwatchConfig;
use crate::error::DetectError;
use crate::evaluator::{FrameResult, SlotEvaluator, Style};
use crate::preprocess::{BinaryMap, Frame, Preprocessor};
use crate::slots::SlotLayout;

/// Everything a detection run needs, owned in one place: the slot layout
/// loaded for this session, the tuned pipeline stages and the record of
/// which sources have already been processed.
#[derive(Debug, Clone)]
pub struct DetectionSession {
    layout: SlotLayout,
    preprocessor: Preprocessor,
    evaluator: SlotEvaluator,
    processed: HashSet<String>,
}

impl DetectionSession {
    pub fn new(layout: SlotLayout, config: &ParkwatchConfig) -> Result<Self, DetectError> {
        config.validate()?;
        let preprocessor = Preprocessor::new(config.preprocess)?;
        let evaluator = SlotEvaluator::new(
            config.detection.occupancy_threshold,
            Style::from_config(&config.detection, &config.render),
        );

        info!(
            "Detection session ready: {} slots of {}x{}, threshold {}",
            layout.len(),
            layout.slot_width,
            layout.slot_height,
            evaluator.threshold()
        );

        Ok(Self::from_parts(layout, preprocessor, evaluator))
    }

    pub fn from_parts(layout: SlotLayout, preprocessor: Preprocessor, evaluator: SlotEvaluator) -> Self {
        Self {
            layout,
            preprocessor,
            evaluator,
            processed: HashSet::new(),
        }
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Refuse to start a second run over a source this session already
    /// finished.
    pub fn begin_run(&self, source_id: &str) -> Result<(), DetectError> {
        if self.processed.contains(source_id) {
            return Err(DetectError::AlreadyProcessed(source_id.to_string()));
        }
        Ok(())
    }

    /// Record a completed run; a run that failed never gets here.
    pub fn finish_run(&mut self, source_id: &str) {
        debug!("Marking source '{}' as processed", source_id);
        self.processed.insert(source_id.to_string());
    }

    /// Allow a source to be run again.
    pub fn reset_run(&mut self, source_id: &str) -> bool {
        self.processed.remove(source_id)
    }

    /// Frames must match the reference image the slots were drawn on.
    /// Layouts without recorded dimensions are accepted as-is.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DetectError> {
        if !self.layout.has_reference_dimensions() {
            return Ok(());
        }
        if (width, height) != (self.layout.image_width, self.layout.image_height) {
            return Err(DetectError::DimensionMismatch {
                expected_width: self.layout.image_width,
                expected_height: self.layout.image_height,
                actual_width: width,
                actual_height: height,
            });
        }
        Ok(())
    }

    pub fn evaluate(&self, frame: &Frame) -> Result<FrameResult, DetectError> {
        self.check_dimensions(frame.width(), frame.height())?;
        let map = self.preprocessor.process(frame);
        Ok(self.evaluate_binary(&map))
    }

    /// Classify slots against an already preprocessed map.
    pub fn evaluate_binary(&self, map: &BinaryMap) -> FrameResult {
        self.evaluator.evaluate(map, &self.layout)
    }
}
