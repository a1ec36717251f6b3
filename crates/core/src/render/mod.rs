use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::watch, time::Instant};

use crate::deck::Card;

/// Length of the entrance animation for a dealt card.
pub const DEFAULT_TRANSITION: Duration = Duration::from_millis(400);

/// Rendering surface the sequencer drives.
///
/// `show_card` resolves once the entrance transition has finished. Missing
/// artwork is the renderer's problem: it should fall back to a placeholder
/// rather than fail.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn show_card(&self, card: &Card);
    /// Freezes an in-flight transition where it is. Called before the
    /// transition has started, it holds the next one at its first frame.
    fn pause_transition(&self);
    fn resume_transition(&self);
    /// Removes the shown card and abandons any in-flight transition.
    fn clear(&self);
    fn resize(&self, width: u32, height: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Finished,
    Cancelled,
}

/// Timed animation that can be frozen and later continued from the exact
/// point it was paused at.
#[derive(Debug)]
pub struct Transition {
    duration: Duration,
    control: watch::Sender<Control>,
}

impl Transition {
    pub fn new(duration: Duration) -> Self {
        let (control, _) = watch::channel(Control::Running);
        Self { duration, control }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn pause(&self) {
        self.set(Control::Paused);
    }

    pub fn resume(&self) {
        self.set(Control::Running);
    }

    pub fn cancel(&self) {
        self.control.send_replace(Control::Cancelled);
    }

    pub fn is_paused(&self) -> bool {
        *self.control.borrow() == Control::Paused
    }

    fn set(&self, next: Control) {
        self.control.send_if_modified(|current| {
            if *current == Control::Cancelled || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Plays the transition to completion, honouring pauses along the way.
    pub async fn run(&self) -> TransitionOutcome {
        let mut control = self.control.subscribe();
        let mut remaining = self.duration;

        loop {
            let state = *control.borrow_and_update();
            match state {
                Control::Cancelled => return TransitionOutcome::Cancelled,
                Control::Paused => {
                    if control.changed().await.is_err() {
                        return TransitionOutcome::Cancelled;
                    }
                }
                Control::Running => {
                    if remaining.is_zero() {
                        return TransitionOutcome::Finished;
                    }
                    let started = Instant::now();
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => return TransitionOutcome::Finished,
                        changed = control.changed() => {
                            remaining = remaining.saturating_sub(started.elapsed());
                            if changed.is_err() {
                                return TransitionOutcome::Cancelled;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Viewport dimensions used to size the shown card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardLayout {
    pub width: u32,
    pub height: u32,
}

impl CardLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale that fits a `card_width × card_height` image into the viewport,
    /// capped at 1.5×.
    pub fn scale_for(&self, card_width: f32, card_height: f32) -> f32 {
        if card_width <= 0.0 || card_height <= 0.0 {
            return 1.0;
        }
        let by_width = self.width as f32 * 0.75 / card_width;
        let by_height = self.height as f32 * 0.8 / card_height;
        by_width.min(by_height).min(1.5)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

#[derive(Debug)]
struct StageState {
    shown: Option<Card>,
    transition: Option<Arc<Transition>>,
    /// A pause arrived with no transition to freeze.
    hold: bool,
    layout: CardLayout,
}

/// Bookkeeping shared by concrete renderers: the currently shown card, its
/// in-flight transition and the layout.
#[derive(Debug)]
pub struct Stage {
    transition_duration: Duration,
    state: Mutex<StageState>,
}

impl Stage {
    pub fn new(layout: CardLayout, transition_duration: Duration) -> Self {
        Self {
            transition_duration,
            state: Mutex::new(StageState {
                shown: None,
                transition: None,
                hold: false,
                layout,
            }),
        }
    }

    /// Replaces whatever is shown with `card` and returns its fresh transition.
    pub fn present(&self, card: &Card) -> Arc<Transition> {
        let transition = Arc::new(Transition::new(self.transition_duration));
        let mut state = self.state();
        if std::mem::take(&mut state.hold) {
            transition.pause();
        }
        if let Some(previous) = state.transition.replace(transition.clone()) {
            previous.cancel();
        }
        state.shown = Some(card.clone());
        transition
    }

    /// Forgets `transition` once it is done, unless it was already replaced.
    pub fn settle(&self, transition: &Arc<Transition>) {
        let mut state = self.state();
        if state
            .transition
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, transition))
        {
            state.transition = None;
        }
    }

    pub fn pause(&self) {
        let mut guard = self.state();
        let state = &mut *guard;
        match &state.transition {
            Some(transition) => transition.pause(),
            None => state.hold = true,
        }
    }

    pub fn resume(&self) {
        let mut state = self.state();
        state.hold = false;
        if let Some(transition) = &state.transition {
            transition.resume();
        }
    }

    pub fn clear(&self) {
        let mut state = self.state();
        if let Some(transition) = state.transition.take() {
            transition.cancel();
        }
        state.hold = false;
        state.shown = None;
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.state().layout = CardLayout::new(width, height);
    }

    pub fn shown(&self) -> Option<Card> {
        self.state().shown.clone()
    }

    pub fn layout(&self) -> CardLayout {
        self.state().layout
    }

    pub fn in_transition(&self) -> bool {
        self.state().transition.is_some()
    }

    fn state(&self) -> MutexGuard<'_, StageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Renderer without an output surface. It still plays transitions in real
/// (or virtual) time, which keeps deal cadence identical to a visible run.
#[derive(Debug)]
pub struct HeadlessRenderer {
    stage: Stage,
    history: Mutex<Vec<Card>>,
}

impl HeadlessRenderer {
    pub fn new(transition_duration: Duration) -> Self {
        Self {
            stage: Stage::new(CardLayout::new(800, 600), transition_duration),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Every card whose transition finished, oldest first.
    pub fn presented(&self) -> Vec<Card> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION)
    }
}

#[async_trait]
impl Renderer for HeadlessRenderer {
    async fn show_card(&self, card: &Card) {
        let transition = self.stage.present(card);
        if transition.run().await == TransitionOutcome::Finished {
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(card.clone());
        }
        self.stage.settle(&transition);
    }

    fn pause_transition(&self) {
        self.stage.pause();
    }

    fn resume_transition(&self) {
        self.stage.resume();
    }

    fn clear(&self) {
        self.stage.clear();
    }

    fn resize(&self, width: u32, height: u32) {
        self.stage.resize(width, height);
    }
}
