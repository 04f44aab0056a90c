//! Sample-accurate software mixer
//!
//! Renders scheduled sources against a frame clock that only advances as
//! output is rendered, the same way a browser audio context does.

use std::sync::Arc;

use super::pcm::AudioBuffer;

/// Tolerance, in frames or buffer samples, for boundaries that land on an integer
const FRAME_EPSILON: f64 = 1e-6;

/// Handle to a scheduled source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

/// A source scheduled on the mixer clock
///
/// The read position is derived from the frame index, so a fractional start
/// carries into every sample and back-to-back sources neither overlap nor
/// leave a gap.
#[derive(Debug)]
struct Voice {
    id: SourceId,
    buffer: Arc<AudioBuffer>,
    /// Exact start in fractional output frames
    origin: f64,
    /// First output frame the voice is heard on
    start_frame: u64,
    /// Buffer samples consumed per output frame
    step: f64,
}

impl Voice {
    /// Read position in buffer samples at output frame `frame`
    #[allow(clippy::cast_precision_loss)]
    fn position(&self, frame: u64) -> f64 {
        ((frame as f64 - self.origin) * self.step).max(0.0)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sample(&self, frame: u64) -> f32 {
        let position = self.position(frame);
        let samples = &self.buffer.samples;
        let index = position.floor() as usize;
        let Some(&current) = samples.get(index) else {
            return 0.0;
        };
        let next = samples.get(index + 1).copied().unwrap_or(current);
        let frac = (position - position.floor()) as f32;
        (next - current).mul_add(frac, current)
    }

    /// Whether the buffer is exhausted by output frame `frame`
    #[allow(clippy::cast_precision_loss)]
    fn is_done(&self, frame: u64) -> bool {
        self.position(frame) >= self.buffer.samples.len() as f64 - FRAME_EPSILON
    }
}

/// Mixes scheduled mono buffers into an interleaved output stream
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    gain: f32,
    target_gain: f32,
    gain_coeff: f32,
    voices: Vec<Voice>,
    finished: Vec<SourceId>,
    next_id: u64,
}

impl Mixer {
    /// Create a mixer rendering at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            gain: 1.0,
            target_gain: 1.0,
            gain_coeff: 1.0,
            voices: Vec::new(),
            finished: Vec::new(),
            next_id: 0,
        }
    }

    /// Output sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of output rendered so far
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / f64::from(self.sample_rate)
    }

    /// Current (smoothed) gain
    #[must_use]
    pub const fn gain(&self) -> f32 {
        self.gain
    }

    /// Number of sources scheduled or playing
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.voices.len()
    }

    /// Schedule `buffer` to start at `when` seconds on the mixer clock
    ///
    /// A start time in the past plays immediately.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn start(&mut self, buffer: Arc<AudioBuffer>, when: f64, playback_rate: f32) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;

        if buffer.is_empty() {
            self.finished.push(id);
            return id;
        }

        let mut origin = when.max(0.0) * f64::from(self.sample_rate);
        if (origin - origin.round()).abs() < FRAME_EPSILON {
            origin = origin.round();
        }
        let origin = origin.max(self.frames_rendered as f64);
        let rate = f64::from(playback_rate.max(f32::EPSILON));
        let step = rate * f64::from(buffer.sample_rate) / f64::from(self.sample_rate);

        self.voices.push(Voice {
            id,
            buffer,
            origin,
            start_frame: origin.ceil() as u64,
            step,
        });
        id
    }

    /// Stop a source immediately; stopped sources are not reported as finished
    pub fn stop(&mut self, id: SourceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        before != self.voices.len()
    }

    /// Approach `target` exponentially with the given time constant in seconds
    ///
    /// A non-positive time constant applies the gain immediately.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_gain_target(&mut self, target: f32, time_constant: f64) {
        self.target_gain = target;
        if time_constant <= 0.0 {
            self.gain = target;
            self.gain_coeff = 1.0;
        } else {
            let samples = time_constant * f64::from(self.sample_rate);
            self.gain_coeff = (1.0 - (-1.0 / samples).exp()) as f32;
        }
    }

    /// Sources that reached their end since the last call
    pub fn drain_finished(&mut self) -> Vec<SourceId> {
        std::mem::take(&mut self.finished)
    }

    /// Render interleaved frames into `out`, duplicating the mono mix on every channel
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let now = self.frames_rendered;
            let mut mix = 0.0_f32;

            for voice in &self.voices {
                if now < voice.start_frame || voice.is_done(now) {
                    continue;
                }
                mix += voice.sample(now);
            }

            self.gain += (self.target_gain - self.gain) * self.gain_coeff;
            frame.fill((mix * self.gain).clamp(-1.0, 1.0));
            self.frames_rendered += 1;
        }

        let next = self.frames_rendered;
        let finished = &mut self.finished;
        self.voices.retain(|v| {
            if v.is_done(next) {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, len: usize, sample_rate: u32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(vec![value; len], sample_rate))
    }

    #[test]
    fn test_source_starts_on_exact_frame() {
        let mut mixer = Mixer::new(1000);
        let id = mixer.start(constant(0.5, 10, 1000), 0.005, 1.0);

        let mut out = vec![1.0; 20];
        mixer.render(&mut out, 1);

        assert!(out[..5].iter().all(|&s| s == 0.0));
        assert!(out[5..15].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(out[15..].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.drain_finished(), vec![id]);
        assert_eq!(mixer.active_sources(), 0);
    }

    #[test]
    fn test_clock_advances_with_render() {
        let mut mixer = Mixer::new(1000);
        assert!(mixer.current_time().abs() < f64::EPSILON);

        let mut out = vec![0.0; 500];
        mixer.render(&mut out, 2);

        assert!((mixer.current_time() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_playback_rate_shortens_source() {
        let mut mixer = Mixer::new(1000);
        mixer.start(constant(0.25, 100, 1000), 0.0, 2.0);

        let mut out = vec![0.0; 50];
        mixer.render(&mut out, 1);

        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert_eq!(mixer.drain_finished().len(), 1);
    }

    #[test]
    fn test_resamples_to_device_rate() {
        let mut mixer = Mixer::new(2000);
        mixer.start(constant(0.5, 10, 1000), 0.0, 1.0);

        let mut out = vec![0.0; 40];
        mixer.render(&mut out, 1);

        assert!(out[..20].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(out[20..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stopped_source_is_not_finished() {
        let mut mixer = Mixer::new(1000);
        let id = mixer.start(constant(0.5, 100, 1000), 0.0, 1.0);

        assert!(mixer.stop(id));
        assert!(!mixer.stop(id));

        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(mixer.drain_finished().is_empty());
    }

    #[test]
    fn test_gain_smoothing() {
        let mut mixer = Mixer::new(1000);
        mixer.set_gain_target(0.0, 0.1);

        let mut out = vec![0.0; 100];
        mixer.render(&mut out, 1);

        // One time constant: e^-1 of the distance remains
        assert!((mixer.gain() - (-1.0_f32).exp()).abs() < 0.01);

        mixer.set_gain_target(0.3, 0.0);
        assert!((mixer.gain() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overlapping_sources_sum_and_clip() {
        let mut mixer = Mixer::new(1000);
        mixer.start(constant(0.75, 10, 1000), 0.0, 1.0);
        mixer.start(constant(0.75, 10, 1000), 0.0, 1.0);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);

        assert!(out.iter().all(|&s| (s - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_fractional_rate_chunks_are_seamless() {
        let mut mixer = Mixer::new(24_000);
        let rate = 0.7_f32;
        let mut cursor = 0.0;
        for _ in 0..3 {
            mixer.start(constant(0.25, 2400, 24_000), cursor, rate);
            cursor += 0.1 / f64::from(rate);
        }

        let mut out = vec![0.0; 10_400];
        mixer.render(&mut out, 1);

        // 7200 samples at 0.7x end at output frame 10285.7
        assert!(out[..=10_285].iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!(out[10_286..].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.drain_finished().len(), 3);
    }
}
