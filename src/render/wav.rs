// WAV Encoder - 16-bit PCM, interleaved channels (hound)

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

use crate::graph::AudioBuffer;

/// Convert a float sample to 16-bit PCM (clipped to [-1, 1])
pub fn to_pcm16(sample: f32) -> i16 {
    let clipped = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
    (clipped * i16::MAX as f32).round() as i16
}

/// Encode a buffer as a 16-bit PCM WAV file
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in buffer.interleaved() {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_to_pcm16() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), i16::MAX);
        assert_eq!(to_pcm16(-2.0), -i16::MAX);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_encode_interleaves_channels() {
        let buffer = AudioBuffer::new(8000, vec![vec![0.5, 0.25], vec![-0.5, -0.25]]);
        let bytes = encode_wav(&buffer).unwrap();

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![to_pcm16(0.5), to_pcm16(-0.5), to_pcm16(0.25), to_pcm16(-0.25)]);
    }
}
