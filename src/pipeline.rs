use crate::annotate::{draw_annotations, FrameSink};
use crate::config::RenderConfig;
use crate::session::DetectionSession;
use crate::source::FrameSource;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Delay between frames in milliseconds
    pub processing_interval_ms: u64,
    /// Rewind an exhausted source instead of stopping; only honoured with a
    /// `max_frames` bound
    pub loop_source: bool,
    /// Stop after this many frames (0 = unbounded)
    pub max_frames: u64,
}

impl From<&RenderConfig> for PipelineOptions {
    fn from(render: &RenderConfig) -> Self {
        Self {
            processing_interval_ms: render.processing_interval_ms,
            loop_source: render.loop_source,
            max_frames: render.max_frames,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub restarts: u64,
    pub last_free: usize,
    pub last_total: usize,
}

/// Drives frames from a source through a session and into a sink.
pub struct DetectionPipeline {
    session: DetectionSession,
    options: PipelineOptions,
}

impl DetectionPipeline {
    pub fn new(session: DetectionSession, options: PipelineOptions) -> Self {
        if options.loop_source && options.max_frames == 0 {
            warn!("loop_source is ignored without max_frames; the source will play once");
        }
        Self { session, options }
    }

    pub fn session(&self) -> &DetectionSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DetectionSession {
        &mut self.session
    }

    pub async fn run(&mut self, source: &mut dyn FrameSource, sink: &mut dyn FrameSink) -> Result<RunStats> {
        let source_id = source.id().to_string();
        self.session.begin_run(&source_id)?;
        if let Some((width, height)) = source.dimensions() {
            self.session.check_dimensions(width, height)?;
        }

        info!(
            "Starting detection on '{}' with {} slots",
            source_id,
            self.session.layout().len()
        );

        let mut stats = RunStats {
            last_total: self.session.layout().len(),
            ..RunStats::default()
        };
        let mut last_reported: Option<usize> = None;
        let mut frames_since_rewind = 0u64;
        let mut last_stats_time = Instant::now();

        loop {
            if self.options.max_frames > 0 && stats.frames >= self.options.max_frames {
                debug!("Reached frame limit of {}", self.options.max_frames);
                break;
            }

            let frame = match source.next_frame()? {
                Some(frame) => frame,
                None => {
                    // Unbounded or empty passes would rewind forever.
                    if self.options.loop_source
                        && self.options.max_frames > 0
                        && frames_since_rewind > 0
                    {
                        debug!("Source '{}' exhausted, rewinding", source_id);
                        source.rewind()?;
                        stats.restarts += 1;
                        frames_since_rewind = 0;
                        continue;
                    }
                    info!("Source '{}' exhausted", source_id);
                    break;
                }
            };

            let result = self.session.evaluate(&frame)?;
            let mut annotated = frame;
            draw_annotations(&mut annotated, &result.annotations);
            sink.publish(stats.frames, &annotated, &result)?;

            if last_reported != Some(result.free_count) {
                info!("{}", result.summary());
                last_reported = Some(result.free_count);
            } else {
                debug!("Frame {}: {}", stats.frames, result.summary());
            }

            stats.frames += 1;
            stats.last_free = result.free_count;
            stats.last_total = result.total_count;
            frames_since_rewind += 1;

            // Print stats every 100 frames
            if stats.frames % 100 == 0 {
                let fps = 100.0 / last_stats_time.elapsed().as_secs_f32();
                info!("Processed {} frames, current FPS: {:.2}", stats.frames, fps);
                last_stats_time = Instant::now();
            }

            if self.options.processing_interval_ms > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(
                    self.options.processing_interval_ms,
                ))
                .await;
            }
        }

        self.session.finish_run(&source_id);
        info!(
            "Detection complete: {} frames, last count {}/{} free",
            stats.frames, stats.last_free, stats.last_total
        );
        Ok(stats)
    }
}
