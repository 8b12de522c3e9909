//! RIFF/WAVE parsing and de-interleave into aligned per-channel float
//! buffers (§4.D of the mixer design).

use crate::aligned::AlignedF32Buffer;
use crate::error::Error;
use crate::source::AudioSource;

struct FmtChunk {
    format_tag: u16,
    channel_count: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode a complete WAV file (or in-memory byte slice) into an
/// [`AudioSource`].
///
/// Required sequence, matching the design exactly:
/// 1. validate `RIFF` / `WAVE` tags,
/// 2. find the `fmt ` chunk (>= 16 bytes),
/// 3. pick a per-sample converter from the supported format table,
/// 4. find the `data` chunk and de-interleave into padded channel buffers.
/// Read and decode a `.wav` file from disk.
pub fn decode_wav_file(path: impl AsRef<std::path::Path>) -> Result<AudioSource, Error> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    decode_wav(&bytes)
}

pub fn decode_wav(bytes: &[u8]) -> Result<AudioSource, Error> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(Error::FileIsNotWav);
    }

    let fmt = find_fmt_chunk(bytes)?;
    if fmt.channel_count != 1 && fmt.channel_count != 2 {
        return Err(Error::OnlyMonoOrStereo);
    }
    let convert = select_converter(fmt.format_tag, fmt.bits_per_sample)?;

    let data = find_data_chunk(bytes)?;
    let bytes_per_sample = (fmt.bits_per_sample as usize).div_ceil(8);
    let frame_size = bytes_per_sample * fmt.channel_count as usize;
    if frame_size == 0 {
        return Err(Error::InvalidSound);
    }
    let sample_count = data.len() / frame_size;

    let mut channels: Vec<AlignedF32Buffer> = (0..fmt.channel_count)
        .map(|_| AlignedF32Buffer::zeroed(sample_count))
        .collect();

    if fmt.channel_count == 1 {
        let ch = &mut channels[0];
        for (i, frame) in data.chunks_exact(frame_size).enumerate() {
            ch[i] = convert(&frame[0..bytes_per_sample]);
        }
    } else {
        let (left, right) = channels.split_at_mut(1);
        let left = &mut left[0];
        let right = &mut right[0];
        for (i, frame) in data.chunks_exact(frame_size).enumerate() {
            left[i] = convert(&frame[0..bytes_per_sample]);
            right[i] = convert(&frame[bytes_per_sample..2 * bytes_per_sample]);
        }
    }

    Ok(AudioSource::new(fmt.sample_rate, fmt.channel_count, channels))
}

fn find_fmt_chunk(bytes: &[u8]) -> Result<FmtChunk, Error> {
    let chunk = find_chunk(bytes, b"fmt ").ok_or(Error::FormatChunkNotFound)?;
    if chunk.len() < 16 {
        return Err(Error::FormatChunkNotFound);
    }
    let format_tag = u16::from_le_bytes([chunk[0], chunk[1]]);
    let channel_count = u16::from_le_bytes([chunk[2], chunk[3]]);
    let sample_rate = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
    let bits_per_sample = u16::from_le_bytes([chunk[14], chunk[15]]);
    Ok(FmtChunk {
        format_tag,
        channel_count,
        sample_rate,
        bits_per_sample,
    })
}

fn find_data_chunk(bytes: &[u8]) -> Result<&[u8], Error> {
    find_chunk(bytes, b"data").ok_or(Error::DataChunkNotFound)
}

/// Walk RIFF sub-chunks starting right after the `WAVE` tag, returning the
/// body of the first chunk whose id matches `id`. Chunks are padded to an
/// even byte count per the RIFF spec.
fn find_chunk<'a>(bytes: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body_start = offset + 8;
        let body_end = body_start.checked_add(chunk_size)?;
        if body_end > bytes.len() {
            return None;
        }
        if chunk_id == id {
            return Some(&bytes[body_start..body_end]);
        }
        // chunks are word-aligned; skip a pad byte if chunk_size is odd
        offset = body_end + (chunk_size & 1);
    }
    None
}

type Converter = fn(&[u8]) -> f32;

/// Select the "16-bit-scaled float" converter for a (format tag, bits per
/// sample) pair, per the support table in §4.D.
fn select_converter(tag: u16, bits: u16) -> Result<Converter, Error> {
    match (tag, bits) {
        (1, 8) => Ok(|b| (b[0] as f32 - 128.0) * 128.0),
        (1, 16) => Ok(|b| i16::from_le_bytes([b[0], b[1]]) as f32),
        (1, 24) => Ok(|b| {
            let raw = (b[0] as i32) | (b[1] as i32) << 8 | (b[2] as i32) << 16;
            // sign-extend bit 23 into the top byte
            let signed = (raw << 8) >> 8;
            signed as f32 / 256.0
        }),
        (1, 32) => Ok(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 65536.0),
        (3, 32) => Ok(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) * 32767.0),
        (3, 64) => Ok(|b| {
            let v = f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            (v * 32767.0) as f32
        }),
        _ => Err(Error::UnsupportedFormat { tag, bits }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
    }

    fn build_wav(channel_count: u16, sample_rate: u32, bits: u16, tag: u16, data: &[u8]) -> Vec<u8> {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&tag.to_le_bytes());
        fmt.extend_from_slice(&channel_count.to_le_bytes());
        fmt.extend_from_slice(&sample_rate.to_le_bytes());
        let block_align = channel_count * (bits / 8);
        let byte_rate = sample_rate * block_align as u32;
        fmt.extend_from_slice(&byte_rate.to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());

        let mut body = Vec::new();
        push_chunk(&mut body, b"fmt ", &fmt);
        push_chunk(&mut body, b"data", data);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((4 + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn rejects_non_riff() {
        let err = decode_wav(b"not a wav file at all").unwrap_err();
        assert!(matches!(err, Error::FileIsNotWav));
    }

    #[test]
    fn mono_pcm16_round_trip() {
        let samples: [i16; 4] = [10000, -10000, 0, 32000];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let wav = build_wav(1, 44100, 16, 1, &data);
        let src = decode_wav(&wav).unwrap();
        assert_eq!(src.sample_rate, 44100);
        assert_eq!(src.channel_count, 1);
        assert_eq!(src.sample_count, 4);
        let ch = src.channel(0);
        for (a, b) in ch.iter().zip(samples.iter()) {
            assert_eq!(*a, *b as f32);
        }
    }

    #[test]
    fn stereo_deinterleave() {
        let frames: [(i16, i16); 3] = [(100, -100), (200, -200), (300, -300)];
        let mut data = Vec::new();
        for (l, r) in frames {
            data.extend_from_slice(&l.to_le_bytes());
            data.extend_from_slice(&r.to_le_bytes());
        }
        let wav = build_wav(2, 22050, 16, 1, &data);
        let src = decode_wav(&wav).unwrap();
        assert_eq!(src.sample_count, 3);
        assert_eq!(src.channel(0), &[100.0, 200.0, 300.0]);
        assert_eq!(src.channel(1), &[-100.0, -200.0, -300.0]);
    }

    #[test]
    fn missing_fmt_chunk_errors() {
        let mut body = Vec::new();
        push_chunk(&mut body, b"data", &[0, 0]);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((4 + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);

        let err = decode_wav(&out).unwrap_err();
        assert!(matches!(err, Error::FormatChunkNotFound));
    }

    #[test]
    fn unsupported_format_errors() {
        let wav = build_wav(1, 44100, 12, 1, &[0, 0, 0]);
        let err = decode_wav(&wav).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { tag: 1, bits: 12 }));
    }

    #[test]
    fn float32_conversion() {
        let samples: [f32; 2] = [1.0, -0.5];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let wav = build_wav(1, 48000, 32, 3, &data);
        let src = decode_wav(&wav).unwrap();
        assert_eq!(src.channel(0), &[32767.0, -16383.5]);
    }

    #[test]
    fn decode_wav_file_reads_from_disk() {
        let samples: [i16; 2] = [1000, -1000];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let wav = build_wav(1, 44100, 16, 1, &data);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, &wav).unwrap();

        let src = decode_wav_file(&path).unwrap();
        assert_eq!(src.channel(0), &[1000.0, -1000.0]);
    }

    #[test]
    fn decode_wav_file_reports_missing_file() {
        let err = decode_wav_file("/nonexistent/path/to/a.wav").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn padding_tail_is_zero_for_simd_reads() {
        let samples: [i16; 5] = [1, 2, 3, 4, 5];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let wav = build_wav(1, 44100, 16, 1, &data);
        let src = decode_wav(&wav).unwrap();
        let padded = src.channel_padded(0);
        assert_eq!(padded.len(), 8);
        assert_eq!(&padded[5..8], &[0.0, 0.0, 0.0]);
    }
}
