// PCM codec for the live transport
//
// Wire format is mono 16-bit signed little-endian PCM wrapped in base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::backend::AudioSegment;
use crate::error::{Result, VoiceError};

/// Encoded audio ready for embedding in a transport message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmBlob {
    pub mime_type: String,
    /// Base64-encoded PCM bytes
    pub data: String,
}

/// Mime type tag for raw PCM at the given rate
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Decode base64 into raw bytes
pub fn decode(data: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}

/// Encode raw bytes as base64
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Convert float samples to little-endian i16 PCM bytes
///
/// Samples are clamped to [-1.0, 1.0] before scaling so out-of-range input
/// saturates instead of wrapping.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Encode captured float samples into a transport blob
pub fn create_pcm_blob(samples: &[f32], sample_rate: u32) -> PcmBlob {
    PcmBlob {
        mime_type: pcm_mime_type(sample_rate),
        data: encode(&float_to_pcm16(samples)),
    }
}

/// Reinterpret little-endian i16 PCM bytes as a playable segment
pub fn decode_audio_data(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioSegment> {
    if channels == 0 {
        return Err(VoiceError::Decode("channel count must be non-zero".to_string()));
    }

    let frame_bytes = 2 * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(VoiceError::Decode(format!(
            "{} bytes is not a whole number of {}-channel 16-bit frames",
            bytes.len(),
            channels
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(AudioSegment {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00, 0x7f],
            (0..=255).collect(),
        ];
        for bytes in cases {
            assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_malformed_base64() {
        let err = decode("not base64!!").unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_pcm_roundtrip_within_quantization() {
        // Truncating scale by 32767 and normalizing by 32768 keeps every
        // sample within two LSBs of the original.
        let tolerance = 2.0 / 32768.0;
        let samples: Vec<f32> = (0..=200).map(|i| -1.0 + i as f32 * 0.01).collect();

        let blob = create_pcm_blob(&samples, 16000);
        let segment = decode_audio_data(&decode(&blob.data).unwrap(), 16000, 1).unwrap();

        assert_eq!(segment.samples.len(), samples.len());
        for (original, restored) in samples.iter().zip(&segment.samples) {
            assert!(
                (original - restored).abs() <= tolerance,
                "{} restored as {}",
                original,
                restored
            );
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let bytes = float_to_pcm16(&[1.5, -3.0, 1.0, -1.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![32767, -32767, 32767, -32767]);
    }

    #[test]
    fn test_blob_mime_type() {
        let blob = create_pcm_blob(&[0.0; 4], 16000);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode(&blob.data).unwrap().len(), 8);
    }

    #[test]
    fn test_decode_audio_data_little_endian() {
        let bytes: Vec<u8> = [16384i16, -32768, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let segment = decode_audio_data(&bytes, 24000, 1).unwrap();
        assert_eq!(segment.samples, vec![0.5, -1.0, 0.0]);
        assert_eq!(segment.sample_rate, 24000);
    }

    #[test]
    fn test_decode_audio_data_rejects_partial_frames() {
        assert!(matches!(
            decode_audio_data(&[0, 0, 0], 24000, 1),
            Err(VoiceError::Decode(_))
        ));
        // 2 channels need 4 bytes per frame
        assert!(matches!(
            decode_audio_data(&[0, 0, 0, 0, 0, 0], 24000, 2),
            Err(VoiceError::Decode(_))
        ));
        assert!(decode_audio_data(&[0; 8], 24000, 2).is_ok());
    }
}
