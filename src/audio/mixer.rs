//! # Track Overlay
//!
//! Participants are recorded as independent tracks that all start when their
//! client connected. The reference track is their additive, time-aligned
//! overlay: sample `n` of the result is the (clipped) sum of sample `n` of
//! every input. Tracks are never concatenated or interleaved.
//!
//! ## Format alignment:
//! Decoded tracks keep their native format. When participants differ, every
//! track is raised to the highest sample rate and the highest channel count
//! present (channel up-mix, then linear resampling). Nothing is ever
//! converted down, and a room whose tracks already agree is left untouched.

use crate::audio::track::Track;

/// Overlay all tracks onto the first one.
///
/// ## Behavior:
/// - Returns `None` for an empty input
/// - A single track passes through unchanged
/// - The result is exactly as long as the first track; later tracks are cut
///   at that length, and a shorter one simply stops contributing
/// - Sums saturate at the i16 range instead of wrapping
pub fn overlay(tracks: Vec<Track>) -> Option<Track> {
    let sample_rate = tracks.iter().map(|t| t.sample_rate).max()?;
    let channels = tracks.iter().map(|t| t.channels).max()?;

    let mut tracks = tracks.into_iter();
    let mut combined = conform(tracks.next()?, sample_rate, channels);

    for track in tracks {
        let track = conform(track, sample_rate, channels);
        for (mixed, sample) in combined.samples.iter_mut().zip(track.samples.iter()) {
            *mixed = mixed.saturating_add(*sample);
        }
    }

    Some(combined)
}

/// Convert a track to the given sample rate and channel count.
pub fn conform(track: Track, sample_rate: u32, channels: u16) -> Track {
    let track = remix(track, channels);
    resample(track, sample_rate)
}

/// Change the channel count.
///
/// ## Strategy:
/// - Same count: unchanged
/// - To mono: average every frame
/// - From mono: duplicate the sample into every channel
/// - Anything else: down to mono, then back up
fn remix(track: Track, channels: u16) -> Track {
    if track.channels == channels || channels == 0 || track.channels == 0 {
        return track;
    }

    if channels == 1 {
        let source = track.channels as usize;
        let samples = track
            .samples
            .chunks_exact(source)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / source as i32) as i16
            })
            .collect();
        return Track::new(track.sample_rate, 1, samples);
    }

    if track.channels == 1 {
        let samples = track
            .samples
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
            .collect();
        return Track::new(track.sample_rate, channels, samples);
    }

    remix(remix(track, 1), channels)
}

/// Linear-interpolation resampling, per channel.
fn resample(track: Track, sample_rate: u32) -> Track {
    if track.sample_rate == sample_rate || track.sample_rate == 0 || sample_rate == 0 {
        return track;
    }

    let channels = track.channels as usize;
    let in_frames = track.frames();
    if in_frames == 0 {
        return Track::new(sample_rate, track.channels, Vec::new());
    }

    let ratio = track.sample_rate as f64 / sample_rate as f64;
    let out_frames = (in_frames as u64 * sample_rate as u64 / track.sample_rate as u64) as usize;
    let mut samples = Vec::with_capacity(out_frames * channels);

    for frame in 0..out_frames {
        let position = frame as f64 * ratio;
        let index = position.floor() as usize;
        let fraction = position - index as f64;
        let next = (index + 1).min(in_frames - 1);

        for channel in 0..channels {
            let a = track.samples[index * channels + channel] as f64;
            let b = track.samples[next * channels + channel] as f64;
            let value = a + (b - a) * fraction;
            samples.push(value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        }
    }

    Track::new(sample_rate, track.channels, samples)
}
