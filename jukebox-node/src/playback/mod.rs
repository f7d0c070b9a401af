//! Local playback: queue, position clock, audio output and the sequencer

pub mod clock;
pub mod output;
pub mod queue;
pub mod sequencer;

pub use clock::PositionClock;
pub use output::{AudioOutput, ClockOutput};
pub use queue::{EnqueueOutcome, LocalQueue, LocalQueueItem};
pub use sequencer::{FinishReason, PlaybackSnapshot, PlaybackState, Sequencer};
