//! Audio capture, mixing and playback
//!
//! Microphone frames are captured at 16 kHz and streamed to the backend;
//! returned 24 kHz audio is scheduled gaplessly through a software mixer.

mod capture;
mod device;
mod mixer;
mod output;
pub mod pcm;
mod sequencer;
mod settings;

pub use capture::{CpalMicrophone, FRAME_SIZE, FrameAssembler, Microphone, downmix};
pub use mixer::{Mixer, SourceId};
pub use output::{AudioOutput, OutputContext, OutputHandle};
pub use pcm::AudioBuffer;
pub use sequencer::{GAIN_TIME_CONSTANT, OutputFactory, Playback, PlaybackSequencer, ScheduledChunk};
pub use settings::{AudioSettings, MAX_SPEED, MIN_SPEED};
