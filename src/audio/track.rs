//! # Decoded Audio Tracks
//!
//! `Track` is the common sample representation every participant stream is
//! decoded into, and the shape of the merged track handed to the archive.
//!
//! ## Sample Format:
//! - **Encoding**: signed 16-bit integers
//! - **Layout**: interleaved when `channels > 1` (L R L R ...)
//! - **Rate / channels**: carried alongside the samples, never assumed

use crate::error::DecodeError;
use std::io::{Cursor, Seek, Write};

/// Interleaved 16-bit PCM audio with its format.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl Track {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    /// A track of `frames` frames of silence.
    #[cfg(test)]
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self::new(sample_rate, channels, vec![0; frames * channels as usize])
    }

    /// Parse a 16-bit PCM WAV file, keeping whatever rate and channel count
    /// its header declares.
    ///
    /// ## Validation:
    /// - The file must carry a readable header and a data chunk
    /// - Samples must be 16-bit (the decoder always asks for `pcm_s16le`)
    /// - The data must not be empty (a decoder that "succeeds" with nothing is a failure)
    pub fn from_wav(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (header, data) = wav::read(&mut Cursor::new(bytes))
            .map_err(|e| DecodeError::MalformedOutput(format!("unreadable WAV: {}", e)))?;

        if header.sampling_rate == 0 || header.channel_count == 0 {
            return Err(DecodeError::MalformedOutput(
                "WAV header has zero sample rate or channels".to_string(),
            ));
        }

        let samples = match data {
            wav::BitDepth::Sixteen(samples) => samples,
            wav::BitDepth::Empty => Vec::new(),
            _ => {
                return Err(DecodeError::MalformedOutput(format!(
                    "expected 16-bit samples, got {} bits",
                    header.bits_per_sample
                )))
            }
        };

        if samples.is_empty() {
            return Err(DecodeError::MalformedOutput(
                "decoder produced no samples".to_string(),
            ));
        }
        if samples.len() % header.channel_count as usize != 0 {
            return Err(DecodeError::MalformedOutput(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                header.channel_count
            )));
        }

        Ok(Self::new(header.sampling_rate, header.channel_count, samples))
    }

    /// Parse raw little-endian signed 16-bit PCM.
    #[cfg(test)]
    pub fn from_pcm_s16le(data: &[u8], sample_rate: u32, channels: u16) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::MalformedOutput(
                "decoder produced no samples".to_string(),
            ));
        }

        let frame_bytes = 2 * channels as usize;
        if frame_bytes == 0 || data.len() % frame_bytes != 0 {
            return Err(DecodeError::MalformedOutput(format!(
                "{} bytes is not a whole number of {}-channel 16-bit frames",
                data.len(),
                channels
            )));
        }

        use byteorder::{LittleEndian, ReadBytesExt};

        let mut cursor = Cursor::new(data);
        let mut samples = Vec::with_capacity(data.len() / 2);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample);
        }

        Ok(Self::new(sample_rate, channels, samples))
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Encode the track as a 16-bit PCM WAV file.
    pub fn write_wav<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, self.channels, self.sample_rate, 16);
        wav::write(header, &wav::BitDepth::Sixteen(self.samples.clone()), writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pcm_s16le() {
        let mut data = Vec::new();
        for sample in [0i16, 1000, -1000, i16::MAX] {
            data.extend_from_slice(&sample.to_le_bytes());
        }

        let track = Track::from_pcm_s16le(&data, 16000, 2).unwrap();
        assert_eq!(track.samples, vec![0, 1000, -1000, i16::MAX]);
        assert_eq!(track.frames(), 2);
    }

    #[test]
    fn test_from_pcm_rejects_partial_frames() {
        assert!(matches!(
            Track::from_pcm_s16le(&[0u8; 3], 16000, 1),
            Err(DecodeError::MalformedOutput(_))
        ));
        // 6 bytes = 3 mono samples, but only 1.5 stereo frames
        assert!(Track::from_pcm_s16le(&[0u8; 6], 16000, 2).is_err());
        assert!(Track::from_pcm_s16le(&[], 16000, 1).is_err());
    }

    #[test]
    fn test_from_wav_keeps_native_format() {
        let original = Track::new(48000, 2, vec![1, -1, 2, -2, 3, -3]);
        let mut cursor = Cursor::new(Vec::new());
        original.write_wav(&mut cursor).unwrap();

        let parsed = Track::from_wav(&cursor.into_inner()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.frames(), 3);
    }

    #[test]
    fn test_from_wav_rejects_garbage_and_empty_data() {
        assert!(matches!(Track::from_wav(&[]), Err(DecodeError::MalformedOutput(_))));
        assert!(matches!(
            Track::from_wav(b"definitely not a riff file"),
            Err(DecodeError::MalformedOutput(_))
        ));

        let mut cursor = Cursor::new(Vec::new());
        Track::new(16000, 1, Vec::new()).write_wav(&mut cursor).unwrap();
        assert!(Track::from_wav(&cursor.into_inner()).is_err());
    }

    #[test]
    fn test_duration() {
        let track = Track::silence(16000, 1, 8000);
        assert_eq!(track.duration_seconds(), 0.5);

        let stereo = Track::silence(8000, 2, 8000);
        assert_eq!(stereo.samples.len(), 16000);
        assert_eq!(stereo.duration_seconds(), 1.0);
    }

    #[test]
    fn test_write_wav_header() {
        let track = Track::new(16000, 1, vec![1, -1, 2, -2]);
        let mut cursor = Cursor::new(Vec::new());
        track.write_wav(&mut cursor).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let (header, data) = wav::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(header.sampling_rate, 16000);
        assert_eq!(header.channel_count, 1);
        match data {
            wav::BitDepth::Sixteen(samples) => assert_eq!(samples, vec![1, -1, 2, -2]),
            _ => panic!("expected 16-bit samples"),
        }
    }
}
