//! Playback sequencer integration tests
//!
//! Tests scheduling against an offline output without audio hardware

use lumen_assistant::audio::pcm::f32_to_pcm16;
use lumen_assistant::AudioSettings;

mod common;

/// Generate sine wave audio samples at 24 kHz
fn generate_sine_samples(frequency: f32, samples: usize, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / 24_000.0;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_back_to_back_chunks_have_no_gap() {
    let (playback, handle) = common::offline_playback();
    let chunk = f32_to_pcm16(&vec![0.5; 240]);

    let starts: Vec<f64> = (0..5)
        .map(|_| playback.enqueue_chunk(&chunk).unwrap().unwrap().start)
        .collect();

    for pair in starts.windows(2) {
        assert!((pair[1] - pair[0] - 0.01).abs() < 1e-9);
    }

    // Every rendered frame inside the queued span carries signal
    let out = handle.render(1200);
    assert!(out.iter().all(|&s| s > 0.4));
    let out = handle.render(10);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(playback.is_idle());
}

#[test]
fn test_cursor_never_moves_backward() {
    let (playback, handle) = common::offline_playback();
    let chunk = f32_to_pcm16(&generate_sine_samples(440.0, 480, 0.3));

    let mut last = 0.0;
    for step in 0..6 {
        playback.enqueue_chunk(&chunk).unwrap();
        assert!(playback.cursor() >= last);
        last = playback.cursor();
        if step % 2 == 0 {
            handle.render(960);
        }
    }
}

#[test]
fn test_speed_change_applies_to_later_chunks_only() {
    let (playback, _handle) = common::offline_playback();
    let chunk = f32_to_pcm16(&vec![0.1; 2400]);

    let first = playback.enqueue_chunk(&chunk).unwrap().unwrap();
    playback.set_audio_settings(AudioSettings::default().with_speed(2.0));
    let second = playback.enqueue_chunk(&chunk).unwrap().unwrap();

    assert!((first.duration - 0.1).abs() < 1e-9);
    assert!((second.start - 0.1).abs() < 1e-9);
    assert!((second.duration - 0.05).abs() < 1e-9);
}

#[test]
fn test_volume_change_is_smoothed() {
    let (playback, handle) = common::offline_playback();
    playback
        .enqueue_chunk(&f32_to_pcm16(&vec![0.5; 24_000]))
        .unwrap();
    handle.render(10);

    playback.set_audio_settings(AudioSettings::default().with_volume(0.0));
    let out = handle.render(2400);

    // No step: the first frame after the change is still close to full level
    assert!(out[0] > 0.45);
    // One time constant later roughly e^-1 of the level remains
    let expected = 0.5 * (-1.0_f32).exp();
    assert!((out[2399] - expected).abs() < 0.02);
}

#[test]
fn test_stop_all_then_enqueue_starts_now() {
    let (playback, handle) = common::offline_playback();
    playback
        .enqueue_chunk(&f32_to_pcm16(&vec![0.5; 24_000]))
        .unwrap();
    handle.render(2400);

    playback.stop_all();
    assert!(playback.cursor().abs() < f64::EPSILON);

    let chunk = playback
        .enqueue_chunk(&f32_to_pcm16(&vec![0.5; 240]))
        .unwrap()
        .unwrap();
    assert!((chunk.start - 0.1).abs() < 1e-9);
}

#[test]
fn test_stop_all_clears_playing_and_future_sources() {
    let (playback, handle) = common::offline_playback();
    let chunk = f32_to_pcm16(&vec![0.5; 2400]);
    for _ in 0..4 {
        playback.enqueue_chunk(&chunk).unwrap();
    }

    // First chunk is mid-play, the other three are still in the future
    handle.render(1200);
    assert_eq!(playback.tracked_sources(), 4);

    playback.stop_all();

    assert_eq!(playback.tracked_sources(), 0);
    assert!(playback.cursor().abs() < f64::EPSILON);
    let out = handle.render(12_000);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(playback.is_idle());
}
