//! Decoding fetched bytes into playable sample data.

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Fully decoded audio held in memory as interleaved `f32` samples.
///
/// Shared read-only between the cache and any number of playing sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Turns encoded bytes into [`DecodedAudio`].
///
/// `hint` is the file extension of the source, if it has one.
#[allow(async_fn_in_trait)]
pub trait Decode {
    async fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedAudio>;
}

/// Decodes with symphonia on tokio's blocking pool.
///
/// Supports WAV, FLAC, Ogg Vorbis, MP3 and AAC/MP4.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoder;

impl Decode for SymphoniaDecoder {
    async fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedAudio> {
        let hint = hint.map(str::to_owned);
        tokio::task::spawn_blocking(move || decode_bytes(bytes, hint.as_deref()))
            .await
            .map_err(|e| Error::Decode(format!("decoder task failed: {e}")))?
    }
}

/// Decode a complete in-memory file.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("unrecognized format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("no audio track".into()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                sample_rate = spec.rate;

                let needed = decoded.capacity() * channels;
                if scratch.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                    scratch = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = scratch.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            // a corrupt packet is skipped, the rest of the stream may be fine
            Err(SymphoniaError::DecodeError(e)) => warn!(error = e, "skipping undecodable packet"),
            Err(e) => return Err(Error::Decode(e.to_string())),
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(Error::Decode("no audio frames decoded".into()));
    }

    debug!(frames = samples.len() / channels, channels, sample_rate, "decoded");
    Ok(DecodedAudio::new(samples, channels, sample_rate))
}
