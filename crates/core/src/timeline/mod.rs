//! Dealing sequencer: owns the shuffled deck and the cursor, and walks through
//! the deck on a timer.
//!
//! Control entry points are synchronous. They mutate state under a short lock
//! and hand any waiting off to single-shot tokio tasks, so at most one deal
//! step is ever in flight. Every step carries an id; a step whose id is no
//! longer the active one (after pause, shuffle, rewind or destroy) drops out
//! without touching state or emitting anything.

mod clock;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, info};

pub use clock::TickTimer;

use crate::{
    audio::Announcer,
    config::{DealerConfig, MIN_INTERVAL},
    deck::{Card, Deck, Face},
    events::{DealPayload, DealerEvent, EventBus, EventKind},
    render::{HeadlessRenderer, Renderer},
    shuffle::{os_rng, BoxedRng},
    speech::Language,
    DealerError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencerState {
    Idle,
    Dealing,
    Paused,
    Complete,
}

/// What the active step is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Waiting,
    /// A step was spawned to deal right away and has not started yet.
    Pending,
    Transition { paused: bool },
}

/// Read-only view of the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerSnapshot {
    pub state: SequencerState,
    pub cursor: usize,
    pub total: usize,
    pub interval: Duration,
    pub deck_count: usize,
    pub language: Language,
    pub repeat: bool,
}

impl SequencerSnapshot {
    pub fn remaining(&self) -> usize {
        self.total - self.cursor
    }
}

struct Timeline {
    deck: Deck,
    /// Cards already dealt in the current pass; `cursor == deck.len()` ends it.
    cursor: usize,
    state: SequencerState,
    phase: Phase,
    timer: TickTimer,
    task: Option<JoinHandle<()>>,
    active: Option<u64>,
    last_step: u64,
    interval: Duration,
    deck_count: usize,
    repeat: bool,
    language: Language,
    rng: BoxedRng,
    destroyed: bool,
}

impl Timeline {
    fn owns(&self, step: u64) -> bool {
        !self.destroyed && self.active == Some(step)
    }

    fn claim_step(&mut self) -> u64 {
        self.last_step += 1;
        self.active = Some(self.last_step);
        self.last_step
    }

    /// Aborts the pending tick or in-flight step and forgets any suspended
    /// remainder.
    fn cancel_pending(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.active = None;
        self.phase = Phase::Idle;
        self.timer.reset();
    }

    fn reshuffle(&mut self) {
        self.deck.shuffle(self.rng.as_mut());
        self.cursor = 0;
    }

    fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            state: self.state,
            cursor: self.cursor,
            total: self.deck.len(),
            interval: self.interval,
            deck_count: self.deck_count,
            language: self.language,
            repeat: self.repeat,
        }
    }
}

enum Step {
    Stale,
    Complete { repeat: bool },
    Deal {
        card: Card,
        index: usize,
        total: usize,
        upcoming: Option<Face>,
        language: Language,
    },
}

struct Shared {
    timeline: Mutex<Timeline>,
    bus: EventBus,
    renderer: Arc<dyn Renderer>,
    announcer: Option<Arc<Announcer>>,
    runtime: Handle,
}

impl Shared {
    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms a single-shot tick `delay` from now.
    fn schedule(self: &Arc<Self>, timeline: &mut Timeline, delay: Duration) {
        let step = timeline.claim_step();
        timeline.phase = Phase::Waiting;
        timeline.timer.arm(Instant::now(), delay);
        let shared = Arc::clone(self);
        timeline.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.deal_next(step).await;
        }));
    }

    /// Deals the card under the cursor right away.
    fn spawn_redeal(self: &Arc<Self>, timeline: &mut Timeline) {
        let step = timeline.claim_step();
        timeline.phase = Phase::Pending;
        let shared = Arc::clone(self);
        timeline.task = Some(self.runtime.spawn(shared.deal_next(step)));
    }

    fn schedule_if_dealing(self: &Arc<Self>, step: u64) {
        let mut guard = self.timeline();
        let timeline = &mut *guard;
        if !timeline.owns(step) {
            return;
        }
        if timeline.state == SequencerState::Dealing {
            let interval = timeline.interval;
            self.schedule(timeline, interval);
        } else {
            timeline.active = None;
        }
    }

    fn begin_step(&self, step: u64) -> Step {
        let mut guard = self.timeline();
        let timeline = &mut *guard;
        if !timeline.owns(step) {
            return Step::Stale;
        }
        timeline.timer.fire();

        match timeline.deck.get(timeline.cursor).cloned() {
            Some(card) => {
                timeline.cursor += 1;
                timeline.phase = Phase::Transition { paused: false };
                Step::Deal {
                    card,
                    index: timeline.cursor,
                    total: timeline.deck.len(),
                    upcoming: timeline.deck.get(timeline.cursor).map(Card::face),
                    language: timeline.language,
                }
            }
            None => {
                timeline.phase = Phase::Idle;
                if !timeline.repeat {
                    timeline.state = SequencerState::Complete;
                    timeline.active = None;
                }
                Step::Complete {
                    repeat: timeline.repeat,
                }
            }
        }
    }

    async fn deal_next(self: Arc<Self>, step: u64) {
        match self.begin_step(step) {
            Step::Stale => {}
            Step::Complete { repeat } => {
                info!("pass complete");
                self.bus.emit(DealerEvent::Complete);
                if !repeat {
                    return;
                }
                let reshuffled = {
                    let mut timeline = self.timeline();
                    if timeline.owns(step) {
                        timeline.reshuffle();
                    }
                    timeline.owns(step)
                };
                if reshuffled {
                    debug!("reshuffled for the next pass");
                    self.bus.emit(DealerEvent::Shuffle);
                    self.schedule_if_dealing(step);
                }
            }
            Step::Deal {
                card,
                index,
                total,
                upcoming,
                language,
            } => {
                self.renderer.show_card(&card).await;
                let missed_hold = {
                    let mut timeline = self.timeline();
                    if !timeline.owns(step) {
                        return;
                    }
                    let missed = timeline.phase == (Phase::Transition { paused: true });
                    timeline.phase = Phase::Idle;
                    missed
                };
                if missed_hold {
                    // The pause arrived after the card had finished animating.
                    self.renderer.resume_transition();
                }

                self.announce(&card, upcoming, language);
                debug!(card = %card, index, total, "dealt");
                self.bus
                    .emit(DealerEvent::Deal(DealPayload { card, index, total }));
                self.schedule_if_dealing(step);
            }
        }
    }

    /// Fire-and-forget: warm the upcoming card, speak the current one.
    fn announce(&self, card: &Card, upcoming: Option<Face>, language: Language) {
        let Some(announcer) = &self.announcer else {
            return;
        };
        if let Some(face) = upcoming {
            let announcer = Arc::clone(announcer);
            self.runtime.spawn(async move {
                announcer.precache(face, language).await;
            });
        }
        let announcer = Arc::clone(announcer);
        let card = card.clone();
        self.runtime.spawn(async move {
            announcer.speak(&card, language).await;
        });
    }
}

enum StartAction {
    Nothing,
    Resume,
    Started,
}

/// Timeline controller exposed to the UI layer.
///
/// Dropping the sequencer tears it down like [`Sequencer::destroy`].
pub struct Sequencer {
    shared: Arc<Shared>,
}

impl Sequencer {
    pub fn builder() -> SequencerBuilder {
        SequencerBuilder::default()
    }

    /// Registers `handler` for `kind`. Handlers run synchronously in
    /// registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DealerEvent) + Send + Sync + 'static,
    {
        self.shared.bus.on(kind, handler);
    }

    /// Idle/Complete → Dealing. Starting a paused sequencer resumes it.
    pub fn start(&self) {
        let action = {
            let mut guard = self.shared.timeline();
            let timeline = &mut *guard;
            if timeline.destroyed {
                StartAction::Nothing
            } else {
                match timeline.state {
                    SequencerState::Dealing => StartAction::Nothing,
                    SequencerState::Paused => StartAction::Resume,
                    SequencerState::Idle | SequencerState::Complete => {
                        timeline.state = SequencerState::Dealing;
                        let interval = timeline.interval;
                        self.shared.schedule(timeline, interval);
                        StartAction::Started
                    }
                }
            }
        };

        match action {
            StartAction::Nothing => {}
            StartAction::Resume => self.resume(),
            StartAction::Started => {
                info!("dealing started");
                self.shared.bus.emit(DealerEvent::Resume);
            }
        }
    }

    /// Cancels the pending tick (keeping the time it still had to run) and
    /// freezes an in-flight transition.
    pub fn pause(&self) {
        let (announce, freeze) = {
            let mut guard = self.shared.timeline();
            let timeline = &mut *guard;
            if timeline.destroyed {
                return;
            }

            let mut freeze = false;
            match timeline.phase {
                Phase::Waiting => {
                    if let Some(task) = timeline.task.take() {
                        task.abort();
                    }
                    timeline.timer.suspend(Instant::now());
                    timeline.active = None;
                    timeline.phase = Phase::Idle;
                }
                Phase::Transition { paused: false } => {
                    timeline.phase = Phase::Transition { paused: true };
                    freeze = true;
                }
                Phase::Transition { paused: true } | Phase::Pending | Phase::Idle => {}
            }

            let announce = timeline.state == SequencerState::Dealing;
            if announce {
                timeline.state = SequencerState::Paused;
            }
            (announce, freeze)
        };

        if freeze {
            self.shared.renderer.pause_transition();
        }
        if announce {
            debug!("dealing paused");
            self.shared.bus.emit(DealerEvent::Pause);
        }
    }

    /// Paused → Dealing. Continues a frozen transition, otherwise re-arms the
    /// tick with whatever time it had left.
    pub fn resume(&self) {
        let thaw = {
            let mut guard = self.shared.timeline();
            let timeline = &mut *guard;
            if timeline.destroyed || timeline.state != SequencerState::Paused {
                return;
            }
            timeline.state = SequencerState::Dealing;

            match timeline.phase {
                Phase::Transition { paused: true } => {
                    timeline.phase = Phase::Transition { paused: false };
                    true
                }
                // A re-deal is queued or animating; its step re-arms the tick.
                Phase::Transition { paused: false } | Phase::Pending => false,
                Phase::Idle | Phase::Waiting => {
                    let delay = timeline.timer.resume_delay(timeline.interval);
                    self.shared.schedule(timeline, delay);
                    false
                }
            }
        };

        if thaw {
            self.shared.renderer.resume_transition();
        }
        debug!("dealing resumed");
        self.shared.bus.emit(DealerEvent::Resume);
    }

    /// Re-randomises the deck and returns to Idle with the cursor at 0.
    pub fn shuffle(&self) {
        {
            let mut timeline = self.shared.timeline();
            if timeline.destroyed {
                return;
            }
            timeline.cancel_pending();
            timeline.reshuffle();
            timeline.state = SequencerState::Idle;
        }

        self.shared.renderer.clear();
        info!("deck shuffled");
        self.shared.bus.emit(DealerEvent::Shuffle);
    }

    /// Steps back and re-deals. The new cursor is `cursor - steps - 1`,
    /// then the card under it is dealt again (advancing the cursor by one).
    /// Going back past the first card clears the table and emits
    /// `rewind-finished` instead.
    pub fn rewind(&self, steps: usize) {
        self.pause();

        let finished = {
            let mut guard = self.shared.timeline();
            let timeline = &mut *guard;
            if timeline.destroyed || timeline.deck.is_empty() {
                return;
            }

            timeline.cancel_pending();
            match timeline.cursor.checked_sub(steps) {
                // `cursor - steps - 1 < -1`
                None => {
                    timeline.cursor = 0;
                    timeline.state = SequencerState::Idle;
                    true
                }
                Some(target) => {
                    timeline.cursor = target.saturating_sub(1);
                    timeline.state = SequencerState::Paused;
                    self.shared.spawn_redeal(timeline);
                    false
                }
            }
        };

        if finished {
            self.shared.renderer.clear();
            debug!("rewound past the first card");
            self.shared.bus.emit(DealerEvent::RewindFinished);
        }
    }

    /// Sets the pause between deals, clamped to at least 100 ms. Applies
    /// from the next scheduled tick.
    pub fn set_interval(&self, interval_ms: u64) {
        let interval = Duration::from_millis(interval_ms).max(MIN_INTERVAL);
        self.shared.timeline().interval = interval;
    }

    /// Rebuilds the deck for `count` decks (at least one) and reshuffles,
    /// discarding the current pass.
    pub fn set_deck_count(&self, count: usize) {
        let count = count.max(1);
        self.pause();
        {
            let mut timeline = self.shared.timeline();
            if timeline.destroyed {
                return;
            }
            timeline.deck_count = count;
            timeline.deck = Deck::build(count);
            timeline.cursor = 0;
        }
        info!(decks = count, "deck rebuilt");
        self.shuffle();
    }

    pub fn set_language(&self, language: Language) {
        self.shared.timeline().language = language;
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.shared.timeline().repeat = repeat;
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.shared.renderer.resize(width, height);
    }

    /// Tears down timers, in-flight transitions and every handler. Safe to
    /// call more than once.
    pub fn destroy(&self) {
        if self.shared.timeline().destroyed {
            return;
        }
        self.pause();
        {
            let mut timeline = self.shared.timeline();
            timeline.cancel_pending();
            timeline.destroyed = true;
        }
        self.shared.renderer.clear();
        self.shared.bus.clear();
        info!("sequencer destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.timeline().destroyed
    }

    pub fn state(&self) -> SequencerState {
        self.shared.timeline().state
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        self.shared.timeline().snapshot()
    }

    /// Copy of the deck in its current (shuffled) order.
    pub fn deck(&self) -> Deck {
        self.shared.timeline().deck.clone()
    }

    pub fn announcer(&self) -> Option<&Arc<Announcer>> {
        self.shared.announcer.as_ref()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.bus.listener_count(kind)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("snapshot", &self.snapshot())
            .field("bus", &self.shared.bus)
            .finish_non_exhaustive()
    }
}

/// Composes a [`Sequencer`] from its collaborators.
#[derive(Default)]
pub struct SequencerBuilder {
    config: DealerConfig,
    renderer: Option<Arc<dyn Renderer>>,
    announcer: Option<Arc<Announcer>>,
    rng: Option<BoxedRng>,
    runtime: Option<Handle>,
}

impl SequencerBuilder {
    pub fn config(mut self, config: DealerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn announcer(mut self, announcer: Arc<Announcer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    /// Overrides the operating-system random source.
    pub fn rng<R>(mut self, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Runtime that timers and detached work are spawned on. Defaults to the
    /// runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Sequencer> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|err| DealerError::Runtime(err.to_string()))?,
        };
        let config = self.config;
        let deck_count = config.deck_count.max(1);

        let mut timeline = Timeline {
            deck: Deck::build(deck_count),
            cursor: 0,
            state: SequencerState::Idle,
            phase: Phase::Idle,
            timer: TickTimer::new(),
            task: None,
            active: None,
            last_step: 0,
            interval: config.interval(),
            deck_count,
            repeat: config.repeat,
            language: config.language,
            rng: self.rng.unwrap_or_else(os_rng),
            destroyed: false,
        };
        if config.auto_shuffle {
            timeline.reshuffle();
        }

        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(HeadlessRenderer::default()));

        Ok(Sequencer {
            shared: Arc::new(Shared {
                timeline: Mutex::new(timeline),
                bus: EventBus::new(),
                renderer,
                announcer: self.announcer,
                runtime,
            }),
        })
    }
}
