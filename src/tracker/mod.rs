pub mod matching;
pub mod person;

pub use matching::{SlotId, SlotMatching};
pub use person::{JumpEvent, MotionState, PersonTracker, TrackedSlot, TrackerUpdate};
