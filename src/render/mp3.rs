// MP3 Encoder - LAME via mp3lame-encoder, stereo output
// Mono buffers are fed as both stereo inputs; samples go in 1152-frame blocks

use mp3lame_encoder::{Bitrate, Builder, DualPcm, FlushNoGap, Quality};

use crate::graph::AudioBuffer;

use super::wav::to_pcm16;

/// Frames handed to LAME per encode call (one MPEG-1 Layer III frame)
pub const MP3_BLOCK: usize = 1152;

/// Nearest supported bitrate at or below the requested kbps
pub fn bitrate_for(kbps: u32) -> Bitrate {
    match kbps {
        0..=111 => Bitrate::Kbps96,
        112..=143 => Bitrate::Kbps128,
        144..=175 => Bitrate::Kbps160,
        176..=207 => Bitrate::Kbps192,
        208..=239 => Bitrate::Kbps224,
        240..=287 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// Encode a buffer as MP3
pub fn encode_mp3(buffer: &AudioBuffer, kbps: u32) -> Result<Vec<u8>, String> {
    let mut builder = Builder::new().ok_or_else(|| "Failed to create LAME encoder".to_string())?;
    builder
        .set_num_channels(2)
        .map_err(|e| format!("Channels: {:?}", e))?;
    builder
        .set_sample_rate(buffer.sample_rate)
        .map_err(|e| format!("Sample rate: {:?}", e))?;
    builder
        .set_brate(bitrate_for(kbps))
        .map_err(|e| format!("Bitrate: {:?}", e))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| format!("Quality: {:?}", e))?;
    let mut encoder = builder.build().map_err(|e| format!("Build: {:?}", e))?;

    let left: Vec<i16> = match buffer.channels.first() {
        Some(channel) => channel.iter().copied().map(to_pcm16).collect(),
        None => Vec::new(),
    };
    let right: Vec<i16> = match buffer.channels.get(1) {
        Some(channel) => channel.iter().copied().map(to_pcm16).collect(),
        None => left.clone(),
    };

    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(left.len()));
    for (l, r) in left.chunks(MP3_BLOCK).zip(right.chunks(MP3_BLOCK)) {
        let input = DualPcm { left: l, right: r };
        encoder
            .encode_to_vec(input, &mut out)
            .map_err(|e| format!("Encode: {:?}", e))?;
    }
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| format!("Flush: {:?}", e))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_mapping() {
        assert!(matches!(bitrate_for(64), Bitrate::Kbps96));
        assert!(matches!(bitrate_for(192), Bitrate::Kbps192));
        assert!(matches!(bitrate_for(320), Bitrate::Kbps320));
    }

    #[test]
    fn test_encode_mono_buffer() {
        let tone: Vec<f32> = (0..44_100)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 0.5)
            .collect();
        let buffer = AudioBuffer::from_mono(44_100, tone, 1);
        let bytes = encode_mp3(&buffer, 192).unwrap();
        assert!(!bytes.is_empty());
    }
}
