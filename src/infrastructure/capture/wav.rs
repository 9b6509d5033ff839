//! RIFF/WAVE helpers for 16-bit PCM
//!
//! The capture encoder streams WAV without knowing the final length, so
//! its header carries `0xFFFFFFFF` sizes. [`parse`] accepts those as well
//! as truncated data chunks.

/// Size of the canonical PCM header
pub const HEADER_LEN: usize = 44;

/// Placeholder for sizes unknown while streaming
const UNKNOWN_SIZE: u32 = u32::MAX;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Decoded 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl Pcm {
    /// Drop a trailing partial frame
    pub fn whole_frames(mut self) -> Self {
        let channels = self.channels.max(1) as usize;
        let whole = self.samples.len() - self.samples.len() % channels;
        self.samples.truncate(whole);
        self
    }
}

/// Canonical header for a mono 16-bit stream of unknown length
pub fn streaming_header(sample_rate: u32) -> [u8; HEADER_LEN] {
    let channels: u16 = 1;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&UNKNOWN_SIZE.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&UNKNOWN_SIZE.to_le_bytes());
    header
}

/// Serialize samples as little-endian 16-bit PCM
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian 16-bit PCM; a trailing odd byte is dropped
pub fn le_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Parse a 16-bit PCM WAV file
pub fn parse(bytes: &[u8]) -> Result<Pcm, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".to_string());
    }

    let mut format: Option<(u16, u32)> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + 8;
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err("truncated fmt chunk".to_string());
                }
                let tag = read_u16(body, 0);
                let channels = read_u16(body, 2);
                let sample_rate = read_u32(body, 4);
                let bits = read_u16(body, 14);
                if tag != PCM_FORMAT_TAG || bits != BITS_PER_SAMPLE {
                    return Err(format!(
                        "unsupported WAV encoding (format {tag}, {bits} bits)"
                    ));
                }
                if channels == 0 || sample_rate == 0 {
                    return Err("invalid WAV format chunk".to_string());
                }
                format = Some((channels, sample_rate));
            }
            b"data" => {
                let (channels, sample_rate) =
                    format.ok_or_else(|| "data chunk before fmt chunk".to_string())?;
                let pcm = Pcm {
                    sample_rate,
                    channels,
                    samples: le_bytes_to_samples(body),
                };
                return Ok(pcm.whole_frames());
            }
            _ => {}
        }

        // Chunks are word aligned
        offset = body_start.saturating_add(size).saturating_add(size & 1);
    }

    Err("no data chunk".to_string())
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
