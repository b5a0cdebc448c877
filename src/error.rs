use thiserror::Error;

/// Precondition failures raised by the detection core.
///
/// I/O and decode problems stay at the `anyhow` boundary; these are the
/// conditions a caller can match on and report to the operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error(
        "frame is {actual_width}x{actual_height} but slots were drawn on a {expected_width}x{expected_height} reference image"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("source '{0}' was already processed in this session; reset it to run detection again")]
    AlreadyProcessed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("slot at ({x}, {y}) lies outside the {width}x{height} reference image")]
    SlotOutOfBounds { x: u32, y: u32, width: u32, height: u32 },
}
