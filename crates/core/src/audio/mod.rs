use std::{
    io::{Cursor, ErrorKind},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::debug;

use crate::{
    cache::{AudioCache, CacheKey},
    deck::{Card, Face, Rank, Suit},
    speech::Language,
    DealerError, Result,
};

/// Decoded, ready-to-play announcement audio (interleaved f32 samples).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: samples.into(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Turns raw announcement bytes into a playable buffer.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<AudioBuffer>;
}

/// Decoder backed by symphonia's default format/codec registry (mp3, wav).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, raw: &[u8]) -> Result<AudioBuffer> {
        let source = Cursor::new(raw.to_vec());
        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());
        let probed = symphonia::default::get_probe().format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DealerError::Decode("missing default audio track".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        let mut sample_rate = params.sample_rate.unwrap_or(0);
        let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(1);
        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    debug!(reason, "skipping undecodable packet");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if samples.is_empty() || sample_rate == 0 {
            return Err(DealerError::Decode("stream contained no audio".to_string()));
        }
        Ok(AudioBuffer::new(sample_rate, channels, samples))
    }
}

/// Audio output device.
pub trait AudioSink: Send + Sync {
    fn play(&self, buffer: &AudioBuffer, volume: f32);
}

#[derive(Debug, Clone, Copy)]
struct AnnouncerSettings {
    enabled: bool,
    volume: f32,
}

/// Speaks dealt cards through the [`AudioCache`] and an [`AudioSink`].
///
/// Every method here is meant to run detached from the deal timeline; a miss
/// or a failed generation just means nothing is played.
pub struct Announcer {
    cache: Arc<AudioCache>,
    sink: Arc<dyn AudioSink>,
    settings: Mutex<AnnouncerSettings>,
}

impl Announcer {
    pub fn new(cache: Arc<AudioCache>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            cache,
            sink,
            settings: Mutex::new(AnnouncerSettings {
                enabled: true,
                volume: 1.0,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    pub fn is_enabled(&self) -> bool {
        self.settings().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.settings().enabled = enabled;
    }

    pub fn volume(&self) -> f32 {
        self.settings().volume
    }

    /// Sets the playback volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self.settings().volume = volume;
    }

    /// Resolves and plays the announcement for `card`. Returns whether
    /// anything was played.
    pub async fn speak(&self, card: &Card, language: Language) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = CacheKey::new(card.face(), language);
        match self.cache.resolve(&key).await {
            Some(buffer) => {
                self.sink.play(&buffer, self.volume());
                true
            }
            None => false,
        }
    }

    /// Warms the cache entry for `face` without playing it.
    pub async fn precache(&self, face: Face, language: Language) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.cache.precache(&CacheKey::new(face, language)).await
    }

    /// Warms the court cards and aces of every suit. Returns how many resolved.
    pub async fn preload_common_cards(&self, language: Language) -> usize {
        let mut resolved = 0;
        for rank in [Rank::Ace, Rank::King, Rank::Queen, Rank::Jack] {
            for suit in Suit::ALL {
                if self.precache(Face::new(rank, suit), language).await {
                    resolved += 1;
                }
            }
        }
        resolved
    }

    /// Drops every decoded buffer held in memory.
    pub fn clear_cache(&self) {
        self.cache.clear_memory();
    }

    fn settings(&self) -> MutexGuard<'_, AnnouncerSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = *self.settings();
        f.debug_struct("Announcer")
            .field("enabled", &settings.enabled)
            .field("volume", &settings.volume)
            .finish_non_exhaustive()
    }
}
