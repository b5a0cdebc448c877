pub mod annotate;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod filters;
pub mod pipeline;
pub mod preprocess;
pub mod session;
pub mod slots;
pub mod source;

pub use error::DetectError;
pub use evaluator::{FrameResult, SlotClassification, SlotEvaluator};
pub use preprocess::{BinaryMap, Frame, Preprocessor};
pub use session::DetectionSession;
pub use slots::{Slot, SlotLayout, SlotPicker, SlotStore};
