pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pose;
pub mod protocol;
pub mod round;
pub mod sync;
pub mod tracker;

pub use engine::{FrameReport, JumpEngine};
pub use error::EngineError;
