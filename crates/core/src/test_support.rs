//! Fakes shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    audio::{AudioBuffer, AudioDecoder, AudioSink},
    cache::AudioCache,
    events::{DealPayload, DealerEvent, EventKind},
    speech::{AnnouncementGenerator, Language},
    store::MemoryStore,
    timeline::Sequencer,
    DealerError, Result,
};

/// Maps every byte to one sample at 16 kHz mono. Empty input is undecodable.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TestDecoder;

impl AudioDecoder for TestDecoder {
    fn decode(&self, raw: &[u8]) -> Result<AudioBuffer> {
        if raw.is_empty() {
            return Err(DealerError::Decode("empty".to_string()));
        }
        let samples = raw.iter().map(|byte| *byte as f32 / 255.0).collect();
        Ok(AudioBuffer::new(16_000, 1, samples))
    }
}

/// Returns the announcement text as its "audio" and remembers every request.
#[derive(Debug, Default)]
pub(crate) struct CountingGenerator {
    texts: Mutex<Vec<String>>,
}

impl CountingGenerator {
    pub(crate) fn calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnouncementGenerator for CountingGenerator {
    async fn generate(&self, text: &str, _language: Language) -> Result<Vec<u8>> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(text.as_bytes().to_vec())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FailingGenerator;

#[async_trait]
impl AnnouncementGenerator for FailingGenerator {
    async fn generate(&self, _text: &str, _language: Language) -> Result<Vec<u8>> {
        Err(DealerError::generation("quota exceeded"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    played: Mutex<Vec<f32>>,
}

impl RecordingSink {
    pub(crate) fn volumes(&self) -> Vec<f32> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, _buffer: &AudioBuffer, volume: f32) {
        self.played.lock().unwrap().push(volume);
    }
}

/// Memory → in-memory store → counting generator.
pub(crate) fn recording_cache() -> (Arc<AudioCache>, Arc<CountingGenerator>) {
    let generator = Arc::new(CountingGenerator::default());
    let cache = AudioCache::layered(
        Arc::new(MemoryStore::new()),
        generator.clone(),
        Arc::new(TestDecoder),
    );
    (Arc::new(cache), generator)
}

/// Records every event a sequencer emits, in order.
#[derive(Debug, Default, Clone)]
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<DealerEvent>>>,
}

impl EventLog {
    pub(crate) fn attach(sequencer: &Sequencer) -> Self {
        let log = Self::default();
        for kind in EventKind::ALL {
            let events = log.events.clone();
            sequencer.on(kind, move |event| events.lock().unwrap().push(event.clone()));
        }
        log
    }

    pub(crate) fn events(&self) -> Vec<DealerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(DealerEvent::kind).collect()
    }

    pub(crate) fn deals(&self) -> Vec<DealPayload> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DealerEvent::Deal(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}
