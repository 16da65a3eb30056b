//! cucu-clock: a Spanish-speaking talking clock for Linux.

mod announcer;
mod audio;
mod config;
mod engine;
mod phrases;
mod scheduler;
mod silence;
mod speech;
mod tts;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use announcer::{Announcer, AnnouncerEvent};
use audio::{RodioSoundBank, SilentSoundBank, SoundPlayer};
use phrases::{JsonPhraseProvider, PhraseProvider};
use scheduler::Scheduler;
use tts::{EspeakSynthesizer, SpeechSynthesizer};

#[derive(Parser, Debug)]
#[command(name = "cucu-clock", about = "Talking cuckoo clock with quarter-hour announcements")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the startup time announcement
    #[arg(long)]
    quiet_start: bool,

    /// Disable the aphorism follow-up after each announcement
    #[arg(long)]
    no_aphorisms: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cucu-clock starting");

    let config = config::Config::load(args.config.as_deref());

    let sounds: Arc<dyn SoundPlayer> = match RodioSoundBank::open(&config.audio.sounds_dir) {
        Ok(bank) => Arc::new(bank),
        Err(e) => {
            warn!("audio output unavailable: {e}, running without sound cues");
            Arc::new(SilentSoundBank)
        }
    };

    let synthesizer = Arc::new(EspeakSynthesizer::load(&config.tts).await);
    debug!("voices: {:?}", synthesizer.available_voices());

    let phrases: Arc<dyn PhraseProvider> =
        match JsonPhraseProvider::load(&config.aphorisms.phrases_path) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                warn!("aphorisms unavailable: {e:#}");
                Arc::new(JsonPhraseProvider::default())
            }
        };
    if phrases.is_empty() {
        warn!("no aphorisms loaded, announcements will skip the follow-up");
    } else {
        info!("{} aphorisms ready", phrases.len());
    }

    let announcer = Announcer::new(synthesizer, sounds, phrases);
    announcer.set_aphorisms_enabled(config.aphorisms.enabled && !args.no_aphorisms);

    // Mirror announcement events into the log.
    let mut events = announcer.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AnnouncerEvent::Caption(text)) => debug!("caption: {text}"),
                Ok(AnnouncerEvent::PhrasePicked(phrase)) => {
                    info!("aphorism from {}: {}", phrase.chapter_name, phrase.text)
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("event listener lagged, {missed} events dropped")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    let scheduler = Scheduler::new(config.scheduler.engine_config());
    let registered = scheduler.register_jobs(announcer.schedule_entries()).await;
    info!("{registered} announcement jobs registered");
    scheduler.start().await;

    if !args.quiet_start {
        announcer.announce(true);
    }

    // On-demand controls for a headless service: SIGUSR1 crows an aphorism,
    // SIGUSR2 silences whatever is playing.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let announcer = Arc::clone(&announcer);
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let mut usr2 = signal(SignalKind::user_defined2())?;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = usr1.recv() => announcer.speak_phrase(true),
                    _ = usr2.recv() => announcer.silence(),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    announcer.silence();
    scheduler.stop().await;

    Ok(())
}
