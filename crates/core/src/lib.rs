//! Core library for the Card Dealer.
//!
//! A [`Sequencer`] deals cards from one or more shuffled decks on a timer,
//! publishes what happens on an [`events::EventBus`] and drives a
//! [`Renderer`]. Spoken announcements go through a tiered [`AudioCache`]
//! (memory, local store, remote generator) so a card is generated at most
//! once per language.

pub mod assets;
pub mod audio;
pub mod cache;
pub mod config;
pub mod deck;
pub mod error;
pub mod events;
pub mod render;
pub mod shuffle;
pub mod speech;
pub mod store;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use assets::{CardArt, CardAssets, InkColor};
pub use audio::{Announcer, AudioBuffer, AudioDecoder, AudioSink, SymphoniaDecoder};
pub use cache::{AudioCache, CacheKey, CacheStats, CacheTier};
pub use config::{AppConfig, AudioConfig, DealerConfig, DisplayConfig, GeneratorConfig};
pub use deck::{Card, Deck, Face, Rank, Suit};
pub use error::{DealerError, Result};
pub use events::{DealPayload, DealerEvent, EventKind, ListenerError};
pub use render::{CardLayout, HeadlessRenderer, Renderer, Stage, Transition};
pub use speech::{AnnouncementGenerator, Language};
pub use store::{FileStore, LocalStore, MemoryStore};
pub use timeline::{Sequencer, SequencerBuilder, SequencerSnapshot, SequencerState};
