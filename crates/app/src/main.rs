mod console;
mod speech;

use std::{path::PathBuf, sync::Arc};

use card_dealer_core::{
    deck::all_faces, render::DEFAULT_TRANSITION, Announcer, AppConfig, AudioCache, CacheKey,
    CardAssets, CardLayout, DealerError, DealerEvent, EventKind, FileStore, Language, LocalStore,
    MemoryStore, Result, Sequencer, SymphoniaDecoder,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::{
    console::{ConsoleRenderer, LogSink},
    speech::HttpSpeechGenerator,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deal {
            config,
            decks,
            interval_ms,
            language,
            repeat,
            no_audio,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(decks) = decks {
                config.dealer.deck_count = decks;
            }
            if let Some(interval_ms) = interval_ms {
                config.dealer.interval_ms = interval_ms;
            }
            if let Some(language) = language {
                config.dealer.language = language;
            }
            config.dealer.repeat |= repeat;
            config.audio.enabled &= !no_audio;
            run_deal(config).await
        }
        Commands::Precache {
            config,
            language,
            cache_dir,
        } => {
            let mut config = load_config(config.as_ref())?;
            if cache_dir.is_some() {
                config.audio.cache_dir = cache_dir;
            }
            run_precache(&config, language).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

async fn build_cache(config: &AppConfig) -> Result<Arc<AudioCache>> {
    let store: Arc<dyn LocalStore> = match &config.audio.cache_dir {
        Some(dir) => Arc::new(FileStore::open(dir).await?),
        None => Arc::new(MemoryStore::new()),
    };
    let generator = Arc::new(HttpSpeechGenerator::new(&config.audio.generator)?);
    Ok(Arc::new(AudioCache::layered(
        store,
        generator,
        Arc::new(SymphoniaDecoder),
    )))
}

async fn run_deal(config: AppConfig) -> Result<()> {
    tracing::info!(
        decks = config.dealer.deck_count,
        interval_ms = config.dealer.interval_ms,
        language = %config.dealer.language,
        "starting dealer"
    );

    let announcer = Arc::new(Announcer::new(build_cache(&config).await?, Arc::new(LogSink)));
    announcer.set_enabled(config.audio.enabled);
    announcer.set_volume(config.audio.volume);

    let mut assets = CardAssets::new(&config.display.asset_root);
    let found = assets.scan();
    tracing::debug!(found, root = ?assets.root(), "card images");
    let renderer = Arc::new(ConsoleRenderer::new(
        assets,
        CardLayout::new(config.display.width, config.display.height),
        DEFAULT_TRANSITION,
    ));

    let sequencer = Sequencer::builder()
        .config(config.dealer.clone())
        .renderer(renderer)
        .announcer(announcer.clone())
        .build()?;
    attach_listeners(&sequencer);

    if announcer.is_enabled() {
        let announcer = announcer.clone();
        let language = config.dealer.language;
        tokio::spawn(async move {
            let warmed = announcer.preload_common_cards(language).await;
            tracing::debug!(warmed, "common announcements preloaded");
        });
    }

    println!("commands: start | pause | resume | shuffle | rewind [n] | interval <ms> | decks <n> | lang <en|es> | quit");
    sequencer.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => apply(&sequencer, command),
            Ok(None) => {}
            Err(err) => eprintln!("{err}"),
        }
    }

    sequencer.destroy();
    Ok(())
}

async fn run_precache(config: &AppConfig, language: Language) -> Result<()> {
    if config.audio.cache_dir.is_none() {
        return Err(DealerError::msg(
            "precache needs a cache directory (--cache-dir or audio.cache_dir)",
        ));
    }
    let cache = build_cache(config).await?;

    let mut resolved = 0;
    let mut total = 0;
    for face in all_faces() {
        total += 1;
        if cache.precache(&CacheKey::new(face, language)).await {
            resolved += 1;
        } else {
            tracing::warn!(face = %face, %language, "announcement unavailable");
        }
    }

    tracing::info!(resolved, total, %language, "precache finished");
    println!("{resolved}/{total} announcements cached for `{language}`");
    Ok(())
}

fn attach_listeners(sequencer: &Sequencer) {
    sequencer.on(EventKind::Deal, |event| {
        if let DealerEvent::Deal(deal) = event {
            println!("  {}/{} ({} left)", deal.index, deal.total, deal.remaining());
        }
    });
    sequencer.on(EventKind::Shuffle, |_| println!("[shuffled]"));
    sequencer.on(EventKind::Pause, |_| println!("[paused]"));
    sequencer.on(EventKind::Resume, |_| println!("[dealing]"));
    sequencer.on(EventKind::Complete, |_| println!("[deck complete]"));
    sequencer.on(EventKind::RewindFinished, |_| println!("[back at the start]"));
    sequencer.on(EventKind::Error, |event| {
        if let DealerEvent::Error(error) = event {
            tracing::error!(event = %error.event, message = %error.message, "listener failed");
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    Resume,
    Shuffle,
    Rewind(usize),
    Interval(u64),
    Decks(usize),
    Lang(Language),
    Quit,
}

fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    fn number<T: std::str::FromStr>(verb: &str, arg: Option<&str>) -> std::result::Result<T, String> {
        arg.ok_or_else(|| format!("`{verb}` needs a value"))?
            .parse()
            .map_err(|_| format!("`{verb}` needs a number"))
    }

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "shuffle" => Command::Shuffle,
        "rewind" => match arg {
            Some(_) => Command::Rewind(number(verb, arg)?),
            None => Command::Rewind(1),
        },
        "interval" => Command::Interval(number(verb, arg)?),
        "decks" => Command::Decks(number(verb, arg)?),
        "lang" => Command::Lang(
            arg.ok_or_else(|| "`lang` needs en or es".to_string())?
                .parse()
                .map_err(|err: DealerError| err.to_string())?,
        ),
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(command))
}

fn apply(sequencer: &Sequencer, command: Command) {
    match command {
        Command::Start => sequencer.start(),
        Command::Pause => sequencer.pause(),
        Command::Resume => sequencer.resume(),
        Command::Shuffle => sequencer.shuffle(),
        Command::Rewind(steps) => sequencer.rewind(steps),
        Command::Interval(ms) => sequencer.set_interval(ms),
        Command::Decks(count) => sequencer.set_deck_count(count),
        Command::Lang(language) => sequencer.set_language(language),
        Command::Quit => {}
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Deals shuffled playing cards and announces them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deal cards in the terminal, controlled through stdin.
    Deal {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of 52-card decks to shuffle together.
        #[arg(long)]
        decks: Option<usize>,
        /// Pause between cards in milliseconds (minimum 100).
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Announcement language.
        #[arg(short, long)]
        language: Option<Language>,
        /// Reshuffle and keep dealing after the last card.
        #[arg(long)]
        repeat: bool,
        /// Disable spoken announcements.
        #[arg(long)]
        no_audio: bool,
    },
    /// Generate and store announcements for all 52 faces ahead of time.
    Precache {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Announcement language.
        #[arg(short, long, default_value = "en")]
        language: Language,
        /// Directory for stored announcements.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}
