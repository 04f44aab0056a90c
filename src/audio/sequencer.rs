//! Gapless playback sequencing
//!
//! Chunks are scheduled back to back on the output clock: each starts where
//! the previous one ends, or immediately if the queue has drained.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::mixer::SourceId;
use super::output::{AudioOutput, OutputContext};
use super::pcm::AudioBuffer;
use super::settings::AudioSettings;
use crate::gemini::GeminiClient;
use crate::{Error, Persona, Result};

/// Time constant used when the volume changes, in seconds
pub const GAIN_TIME_CONSTANT: f64 = 0.1;

/// Creates the output context on first use
pub type OutputFactory = Box<dyn FnMut() -> Result<Box<dyn AudioOutput>> + Send>;

/// Where a chunk landed on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: SourceId,
    /// Start time in seconds
    pub start: f64,
    /// Wall-clock duration at the current speed, in seconds
    pub duration: f64,
}

/// Schedules decoded audio chunks for gapless playback
pub struct PlaybackSequencer {
    factory: OutputFactory,
    output: Option<Box<dyn AudioOutput>>,
    cursor: f64,
    sources: BTreeSet<SourceId>,
    settings: AudioSettings,
    live_claimed: bool,
    generation: u64,
}

impl std::fmt::Debug for PlaybackSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSequencer")
            .field("cursor", &self.cursor)
            .field("sources", &self.sources.len())
            .field("settings", &self.settings)
            .field("live_claimed", &self.live_claimed)
            .finish_non_exhaustive()
    }
}

impl PlaybackSequencer {
    /// Create a sequencer; `factory` runs on the first enqueue
    #[must_use]
    pub fn new(factory: OutputFactory, settings: AudioSettings) -> Self {
        Self {
            factory,
            output: None,
            cursor: 0.0,
            sources: BTreeSet::new(),
            settings,
            live_claimed: false,
            generation: 0,
        }
    }

    /// Current playback settings
    #[must_use]
    pub const fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Apply new settings
    ///
    /// Volume ramps in smoothly on the existing output. Speed applies to
    /// chunks scheduled from now on; already scheduled chunks keep their rate.
    pub fn set_audio_settings(&mut self, settings: AudioSettings) {
        self.settings = settings;
        if let Some(output) = self.output.as_mut() {
            output.set_gain(settings.volume(), GAIN_TIME_CONSTANT);
        }
        tracing::debug!(
            volume = settings.volume(),
            speed = settings.speed(),
            "playback settings updated"
        );
    }

    /// Decode a PCM16 chunk and schedule it after everything already queued
    ///
    /// Returns `None` for an empty chunk.
    ///
    /// # Errors
    ///
    /// Returns an audio error if the output context cannot be created
    pub fn enqueue_chunk(&mut self, bytes: &[u8]) -> Result<Option<ScheduledChunk>> {
        let buffer = AudioBuffer::from_pcm16(bytes);
        if buffer.is_empty() {
            return Ok(None);
        }
        self.enqueue_buffer(buffer).map(Some)
    }

    /// Schedule a decoded buffer after everything already queued
    ///
    /// # Errors
    ///
    /// Returns an audio error if the output context cannot be created
    pub fn enqueue_buffer(&mut self, buffer: AudioBuffer) -> Result<ScheduledChunk> {
        let speed = self.settings.speed();
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let mut output = (self.factory)()?;
                output.set_gain(self.settings.volume(), 0.0);
                tracing::debug!("playback output created");
                output
            }
        };
        let output = self.output.insert(output);

        for id in output.drain_finished() {
            self.sources.remove(&id);
        }

        let start = self.cursor.max(output.current_time());
        let duration = buffer.duration() / f64::from(speed);
        let id = output.start_source(Arc::new(buffer), start, speed);

        self.cursor = start + duration;
        self.sources.insert(id);

        tracing::trace!(start, duration, "audio chunk scheduled");
        Ok(ScheduledChunk {
            id,
            start,
            duration,
        })
    }

    /// Stop every tracked source and reset the cursor
    ///
    /// Also cancels any one-shot utterance still being synthesized.
    pub fn stop_all(&mut self) {
        if let Some(output) = self.output.as_mut() {
            for id in std::mem::take(&mut self.sources) {
                output.stop_source(id);
            }
            output.drain_finished();
        }
        self.sources.clear();
        self.cursor = 0.0;
        self.generation += 1;
    }

    /// Time at which the next chunk would start, if the queue is still busy
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of sources scheduled or still playing
    pub fn tracked_sources(&mut self) -> usize {
        self.reap();
        self.sources.len()
    }

    /// Whether nothing is scheduled or playing
    pub fn is_idle(&mut self) -> bool {
        self.tracked_sources() == 0
    }

    /// Reserve the sequencer for a live session
    ///
    /// # Errors
    ///
    /// Returns a session error if another live session holds it
    pub fn claim_live(&mut self) -> Result<()> {
        if self.live_claimed {
            return Err(Error::Session("a live session is already active".to_string()));
        }
        self.live_claimed = true;
        Ok(())
    }

    /// Release the live reservation
    pub fn release_live(&mut self) {
        self.live_claimed = false;
    }

    /// Whether a live session holds the sequencer
    #[must_use]
    pub const fn is_live_claimed(&self) -> bool {
        self.live_claimed
    }

    fn reap(&mut self) {
        if let Some(output) = self.output.as_mut() {
            for id in output.drain_finished() {
                self.sources.remove(&id);
            }
        }
    }
}

/// Shared handle to a [`PlaybackSequencer`]
///
/// The lock is never held across an await point.
#[derive(Debug, Clone)]
pub struct Playback {
    inner: Arc<Mutex<PlaybackSequencer>>,
}

impl Playback {
    /// Wrap a sequencer
    #[must_use]
    pub fn new(sequencer: PlaybackSequencer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sequencer)),
        }
    }

    /// Playback on the default output device, opened on first use
    #[must_use]
    pub fn with_default_device(settings: AudioSettings) -> Self {
        let factory: OutputFactory =
            Box::new(|| Ok(Box::new(OutputContext::open_default()?) as Box<dyn AudioOutput>));
        Self::new(PlaybackSequencer::new(factory, settings))
    }

    /// Playback on an existing output
    #[must_use]
    pub fn with_output(output: Box<dyn AudioOutput>, settings: AudioSettings) -> Self {
        let mut slot = Some(output);
        let factory: OutputFactory = Box::new(move || {
            slot.take()
                .ok_or_else(|| Error::Audio("output already taken".to_string()))
        });
        Self::new(PlaybackSequencer::new(factory, settings))
    }

    /// See [`PlaybackSequencer::settings`]
    #[must_use]
    pub fn settings(&self) -> AudioSettings {
        self.lock().settings()
    }

    /// See [`PlaybackSequencer::set_audio_settings`]
    pub fn set_audio_settings(&self, settings: AudioSettings) {
        self.lock().set_audio_settings(settings);
    }

    /// See [`PlaybackSequencer::enqueue_chunk`]
    ///
    /// # Errors
    ///
    /// Returns an audio error if the output context cannot be created
    pub fn enqueue_chunk(&self, bytes: &[u8]) -> Result<Option<ScheduledChunk>> {
        self.lock().enqueue_chunk(bytes)
    }

    /// See [`PlaybackSequencer::stop_all`]
    pub fn stop_all(&self) {
        self.lock().stop_all();
    }

    /// See [`PlaybackSequencer::cursor`]
    #[must_use]
    pub fn cursor(&self) -> f64 {
        self.lock().cursor()
    }

    /// See [`PlaybackSequencer::tracked_sources`]
    #[must_use]
    pub fn tracked_sources(&self) -> usize {
        self.lock().tracked_sources()
    }

    /// See [`PlaybackSequencer::is_idle`]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// See [`PlaybackSequencer::claim_live`]
    ///
    /// # Errors
    ///
    /// Returns a session error if another live session holds the sequencer
    pub fn claim_live(&self) -> Result<()> {
        self.lock().claim_live()
    }

    /// See [`PlaybackSequencer::release_live`]
    pub fn release_live(&self) {
        self.lock().release_live();
    }

    /// Speak `text` once in the persona's voice
    ///
    /// Anything already playing is stopped first. A later call, or a
    /// [`Self::stop_all`] while synthesis is in flight, supersedes this one.
    /// Failures are logged and otherwise ignored.
    pub async fn speak_once(&self, client: &GeminiClient, text: &str, persona: Persona) {
        let generation = {
            let mut sequencer = self.lock();
            sequencer.stop_all();
            sequencer.generation
        };

        let audio = match client.synthesize_speech(text, persona.voice()).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                return;
            }
        };

        let mut sequencer = self.lock();
        if sequencer.generation != generation {
            tracing::debug!("utterance superseded before playback");
            return;
        }
        if let Err(e) = sequencer.enqueue_chunk(&audio) {
            tracing::warn!(error = %e, "failed to play synthesized speech");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackSequencer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
