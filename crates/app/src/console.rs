use std::time::Duration;

use async_trait::async_trait;
use card_dealer_core::{
    assets::{CARD_HEIGHT, CARD_WIDTH},
    render::TransitionOutcome,
    AudioBuffer, AudioSink, Card, CardArt, CardAssets, CardLayout, InkColor, Renderer, Stage,
};
use tracing::{debug, info};

/// Renderer that prints each dealt card to the terminal once its transition
/// has played out.
pub struct ConsoleRenderer {
    stage: Stage,
    assets: CardAssets,
}

impl ConsoleRenderer {
    pub fn new(assets: CardAssets, layout: CardLayout, transition: Duration) -> Self {
        Self {
            stage: Stage::new(layout, transition),
            assets,
        }
    }

    fn draw(&self, card: &Card) {
        let scale = self.stage.layout().scale_for(CARD_WIDTH, CARD_HEIGHT);
        match self.assets.resolve(card.face()) {
            CardArt::Image(path) => {
                println!("[{card}] {} (x{scale:.2})", path.display());
            }
            CardArt::Placeholder { label, ink } => {
                let label = label.replace('\n', " ");
                match ink {
                    InkColor::Red => println!("\x1b[31m[{label}]\x1b[0m (x{scale:.2})"),
                    InkColor::Black => println!("[{label}] (x{scale:.2})"),
                }
            }
        }
    }
}

#[async_trait]
impl Renderer for ConsoleRenderer {
    async fn show_card(&self, card: &Card) {
        let transition = self.stage.present(card);
        if transition.run().await == TransitionOutcome::Finished {
            self.draw(card);
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
        if self.stage.shown().is_some() {
            println!("[table cleared]");
        }
        self.stage.clear();
    }

    fn resize(&self, width: u32, height: u32) {
        debug!(width, height, "viewport resized");
        self.stage.resize(width, height);
    }
}

/// Audio output without a device: logs what would have been played.
#[derive(Debug, Default)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play(&self, buffer: &AudioBuffer, volume: f32) {
        info!(
            duration_ms = buffer.duration().as_millis() as u64,
            sample_rate = buffer.sample_rate(),
            volume,
            "announcement"
        );
    }
}
