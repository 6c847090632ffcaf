//! Take decoding and WAV export
//!
//! Decoding goes through symphonia (WAV/PCM, FLAC and MP3) into a
//! [`SampleBuffer`] at the file's own sample rate; nothing is resampled.
//! Sources with more than two channels keep the first two.
//!
//! Exports are 32-bit float WAV written with hound.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::error::BandtakeError;
use crate::types::{Sample, SampleBuffer};

/// Errors while reading or writing audio files
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Failed to write {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid decoded audio: {0}")]
    Buffer(#[from] BandtakeError),
}

/// Decode an in-memory file
///
/// `extension` (e.g. `"wav"`) helps the format probe but is optional.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, DecodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    decode_stream(Box::new(Cursor::new(bytes)), hint)
}

/// Decode a file from disk
pub fn decode_file(path: &Path) -> Result<SampleBuffer, DecodeError> {
    let file = std::fs::File::open(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let buffer = decode_stream(Box::new(file), hint)?;
    log::info!(
        "Decoded {:?}: {} frames, {} ch, {}Hz",
        path,
        buffer.frame_count(),
        buffer.channel_count(),
        buffer.sample_rate()
    );
    Ok(buffer)
}

/// Decode several takes in parallel, one result per path (same order)
///
/// A failure only affects its own entry.
pub fn load_takes(paths: &[PathBuf]) -> Vec<Result<SampleBuffer, DecodeError>> {
    paths
        .par_iter()
        .map(|path| {
            decode_file(path).inspect_err(|e| log::warn!("Failed to decode take {:?}: {}", path, e))
        })
        .collect()
}

/// Write a buffer as 32-bit float WAV
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<(), DecodeError> {
    let write_error = |e: hound::Error| DecodeError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let spec = hound::WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(write_error)?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(sample).map_err(write_error)?;
    }
    writer.finalize().map_err(write_error)?;

    log::info!(
        "Wrote {:?} ({:.2}s, {} ch)",
        path,
        buffer.duration_seconds(),
        buffer.channel_count()
    );
    Ok(())
}

fn decode_stream(source: Box<dyn MediaSource>, hint: Hint) -> Result<SampleBuffer, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown sample rate".to_string()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut decode_buf: Option<DecodeBuffer<Sample>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        let buf = decode_buf.get_or_insert_with(|| {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            DecodeBuffer::new(decoded.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if channels == 0 {
        return Err(DecodeError::NoAudioTrack);
    }
    Ok(SampleBuffer::from_interleaved(&samples, channels, sample_rate)?)
}
