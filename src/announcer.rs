//! The announcer: what actually happens when a trigger fires.
//!
//! Owns the four quarter-hour schedules, the on-demand announce / speak /
//! silence API, the aphorism history stacks and the shared silence scope.
//! Collaborators (speech, sound cues, phrases) are injected at construction;
//! scheduled job callbacks close over the owning `Arc<Announcer>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::{SoundCue, SoundPlayer};
use crate::phrases::{Phrase, PhraseProvider};
use crate::scheduler::ScheduleEntry;
use crate::silence::SilenceScope;
use crate::speech;
use crate::tts::{SpeakOutcome, SpeechSynthesizer};

/// Pause after cueing most sound effects, before speech begins.
const DEFAULT_PAUSE: Duration = Duration::from_millis(4100);
/// The bells melody runs long.
const BELLS_PAUSE: Duration = Duration::from_millis(15_000);
/// Extra delay after the bells announcement, before the aphorism follow-up.
const BELLS_AFTER_DELAY: Duration = Duration::from_millis(37_000);
/// Gap between the two on-the-hour utterances.
const ON_THE_HOUR_GAP: Duration = Duration::from_millis(250);
/// Pause after the pistol cue in `speak_phrase`.
const PISTOL_PAUSE: Duration = Duration::from_millis(2000);

/// The four quarter-hour announcement slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarterSlot {
    OnTheHour,
    QuarterPast,
    HalfPast,
    QuarterTo,
}

impl QuarterSlot {
    pub const ALL: [QuarterSlot; 4] = [
        QuarterSlot::OnTheHour,
        QuarterSlot::QuarterPast,
        QuarterSlot::HalfPast,
        QuarterSlot::QuarterTo,
    ];

    pub fn minute(self) -> u32 {
        match self {
            QuarterSlot::OnTheHour => 0,
            QuarterSlot::QuarterPast => 15,
            QuarterSlot::HalfPast => 30,
            QuarterSlot::QuarterTo => 45,
        }
    }

    /// Domain trigger expression: this minute, every hour, every day of week.
    pub fn trigger_expression(self) -> &'static str {
        match self {
            QuarterSlot::OnTheHour => "0 * * * SUN-SAT",
            QuarterSlot::QuarterPast => "15 * * * SUN-SAT",
            QuarterSlot::HalfPast => "30 * * * SUN-SAT",
            QuarterSlot::QuarterTo => "45 * * * SUN-SAT",
        }
    }

    pub fn from_minute(minute: u32) -> Option<Self> {
        match minute {
            0 => Some(QuarterSlot::OnTheHour),
            15 => Some(QuarterSlot::QuarterPast),
            30 => Some(QuarterSlot::HalfPast),
            45 => Some(QuarterSlot::QuarterTo),
            _ => None,
        }
    }
}

/// Broadcast to listeners (a UI, the log) as announcements happen.
/// At-least-once; subscribers tolerate duplicates and may lag.
#[derive(Debug, Clone)]
pub enum AnnouncerEvent {
    /// Text of an utterance as it is announced.
    Caption(String),
    /// A phrase was chosen, by a new pick or by history browsing.
    PhrasePicked(Phrase),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("trigger expression `{0}` has no minute field")]
    MissingMinute(String),
    #[error("minute `{0}` is not one of the quarter-hour schedules")]
    UnsupportedMinute(String),
}

#[derive(Default)]
struct History {
    previous: Vec<Phrase>,
    next: Vec<Phrase>,
}

pub struct Announcer {
    tts: Arc<dyn SpeechSynthesizer>,
    sounds: Arc<dyn SoundPlayer>,
    phrases: Arc<dyn PhraseProvider>,
    silence: SilenceScope,
    history: Mutex<History>,
    rng: Mutex<StdRng>,
    events: broadcast::Sender<AnnouncerEvent>,
    aphorisms_enabled: AtomicBool,
}

impl Announcer {
    pub fn new(
        tts: Arc<dyn SpeechSynthesizer>,
        sounds: Arc<dyn SoundPlayer>,
        phrases: Arc<dyn PhraseProvider>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            tts,
            sounds,
            phrases,
            silence: SilenceScope::new(),
            history: Mutex::new(History::default()),
            rng: Mutex::new(StdRng::from_os_rng()),
            events,
            aphorisms_enabled: AtomicBool::new(true),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnnouncerEvent> {
        self.events.subscribe()
    }

    pub fn set_aphorisms_enabled(&self, enabled: bool) {
        self.aphorisms_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn aphorisms_enabled(&self) -> bool {
        self.aphorisms_enabled.load(Ordering::Relaxed)
    }

    pub fn previous_count(&self) -> usize {
        self.history.lock().unwrap().previous.len()
    }

    pub fn next_count(&self) -> usize {
        self.history.lock().unwrap().next.len()
    }

    /// One schedule entry per quarter-hour slot. The job payload carries the
    /// normalized expression text, so the callback re-derives its slot from
    /// the minute field instead of capturing it.
    pub fn schedule_entries(self: &Arc<Self>) -> Vec<ScheduleEntry> {
        QuarterSlot::ALL
            .iter()
            .map(|slot| {
                let announcer = Arc::clone(self);
                ScheduleEntry {
                    expression: slot.trigger_expression().to_string(),
                    callback: Arc::new(move |expression: String| {
                        let announcer = Arc::clone(&announcer);
                        async move {
                            let slot = announcer
                                .schedule_for(&expression)
                                .expect("registered trigger must map to a quarter-hour slot");
                            announcer.run_slot(slot).await
                        }
                        .boxed()
                    }),
                }
            })
            .collect()
    }

    /// Map a serialized trigger expression back to its slot by minute field.
    /// Anything but the four registered minutes is a contract violation.
    pub fn schedule_for(&self, expression: &str) -> Result<QuarterSlot, DispatchError> {
        let minute_field = expression
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| DispatchError::MissingMinute(expression.to_string()))?;
        let minute: u32 = minute_field
            .parse()
            .map_err(|_| DispatchError::UnsupportedMinute(minute_field.to_string()))?;
        QuarterSlot::from_minute(minute)
            .ok_or_else(|| DispatchError::UnsupportedMinute(minute_field.to_string()))
    }

    /// Speak the current time, then the aphorism follow-up. Fire-and-forget;
    /// failures are logged by the supervising task.
    pub fn announce(self: &Arc<Self>, say_milliseconds: bool) {
        info!("announce requested at {}", Local::now().format("%T"));
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.say_current_time(say_milliseconds).await {
                error!(error = format!("{e:#}"), "announce failed");
            }
            debug!("announce finished at {}", Local::now().format("%T"));
        });
    }

    /// Cancel everything in flight and install a fresh token, so operations
    /// starting afterwards are not born pre-cancelled. Never blocks.
    pub fn silence(&self) {
        info!("silencing...");
        self.silence.renew();
        info!("silenced");
    }

    /// Stop whatever is playing and speak a random aphorism, optionally
    /// heralded by one of the rooster cues. Every wait observes the token
    /// captured after the initial silence.
    pub fn speak_phrase(self: &Arc<Self>, with_rooster: bool) {
        self.silence();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.phrase_with_cues(with_rooster).await {
                error!(error = format!("{e:#}"), "speak_phrase failed");
            }
        });
    }

    /// Browse back: move the top of `previous` onto `next` and speak it.
    pub fn previous(self: &Arc<Self>) {
        let phrase = {
            let mut history = self.history.lock().unwrap();
            match history.previous.pop() {
                Some(phrase) => {
                    history.next.push(phrase.clone());
                    phrase
                }
                None => return,
            }
        };
        self.spawn_broadcast_and_speak(phrase);
    }

    /// Browse forward: move the top of `next` onto `previous` and speak it.
    pub fn next(self: &Arc<Self>) {
        let phrase = {
            let mut history = self.history.lock().unwrap();
            match history.next.pop() {
                Some(phrase) => {
                    history.previous.push(phrase.clone());
                    phrase
                }
                None => return,
            }
        };
        self.spawn_broadcast_and_speak(phrase);
    }

    pub(crate) async fn run_slot(&self, slot: QuarterSlot) -> anyhow::Result<()> {
        let token = self.silence.current();
        let now = Local::now().time();

        let outcome = match slot {
            QuarterSlot::OnTheHour => {
                let (first, second) = speech::on_the_hour(now);
                let mut outcome = self
                    .deliver(&first, Some(SoundCue::Cuckoo), DEFAULT_PAUSE, &token)
                    .await?;
                if outcome == SpeakOutcome::Completed {
                    outcome = self.pause(ON_THE_HOUR_GAP, &token).await;
                }
                if outcome == SpeakOutcome::Completed {
                    outcome = self.deliver(&second, None, Duration::ZERO, &token).await?;
                }
                outcome
            }
            QuarterSlot::QuarterPast => {
                self.deliver(
                    &speech::quarter_past(now),
                    Some(SoundCue::Woodpecker),
                    DEFAULT_PAUSE,
                    &token,
                )
                .await?
            }
            QuarterSlot::HalfPast => {
                self.deliver(
                    &speech::half_past(now),
                    Some(SoundCue::Horn),
                    DEFAULT_PAUSE,
                    &token,
                )
                .await?
            }
            QuarterSlot::QuarterTo => {
                let mut outcome = self
                    .deliver(
                        &speech::quarter_to(now),
                        Some(SoundCue::Bells),
                        BELLS_PAUSE,
                        &token,
                    )
                    .await?;
                if outcome == SpeakOutcome::Completed {
                    outcome = self.pause(BELLS_AFTER_DELAY, &token).await;
                }
                outcome
            }
        };

        if outcome == SpeakOutcome::Silenced {
            info!("{slot:?} announcement silenced");
            return Ok(());
        }
        self.speak_random_phrase(&token).await
    }

    async fn say_current_time(&self, say_milliseconds: bool) -> anyhow::Result<()> {
        let token = self.silence.current();
        let text = speech::current_time(Local::now().time(), say_milliseconds);
        let outcome = self
            .deliver(&text, Some(SoundCue::Horn), DEFAULT_PAUSE, &token)
            .await?;
        if outcome == SpeakOutcome::Silenced {
            info!("time announcement silenced");
            return Ok(());
        }
        self.speak_random_phrase(&token).await
    }

    async fn phrase_with_cues(&self, with_rooster: bool) -> anyhow::Result<()> {
        let token = self.silence.current();
        if with_rooster {
            let roosters = [
                (SoundCue::Rooster1, Duration::from_millis(3000)),
                (SoundCue::Rooster2, Duration::from_millis(3500)),
            ];
            let (cue, wait) = {
                let mut rng = self.rng.lock().unwrap();
                roosters[rng.random_range(0..roosters.len())]
            };
            self.sounds.cue(cue, token.clone());
            if self.pause(wait, &token).await == SpeakOutcome::Silenced {
                return Ok(());
            }
        }
        self.sounds.cue(SoundCue::Pistol, token.clone());
        if self.pause(PISTOL_PAUSE, &token).await == SpeakOutcome::Silenced {
            return Ok(());
        }
        self.speak_random_phrase(&token).await
    }

    /// Cue the sound effect, let its pause elapse, then speak. The caption is
    /// broadcast before speech so listeners can show it while it is said.
    async fn deliver(
        &self,
        text: &str,
        cue: Option<SoundCue>,
        pause: Duration,
        token: &CancellationToken,
    ) -> anyhow::Result<SpeakOutcome> {
        info!("{text}");
        let _ = self.events.send(AnnouncerEvent::Caption(text.to_string()));
        if let Some(cue) = cue {
            self.sounds.cue(cue, token.clone());
            if self.pause(pause, token).await == SpeakOutcome::Silenced {
                return Ok(SpeakOutcome::Silenced);
            }
        }
        Ok(self.tts.speak(text, token).await?)
    }

    /// A cancellable wait; silence during a pause is expected control flow.
    async fn pause(&self, duration: Duration, token: &CancellationToken) -> SpeakOutcome {
        match token.run_until_cancelled(sleep(duration)).await {
            Some(()) => SpeakOutcome::Completed,
            None => {
                debug!("pause silenced after less than {duration:?}");
                SpeakOutcome::Silenced
            }
        }
    }

    /// Pick a random aphorism, remember it, broadcast it, speak it. Picking
    /// something new invalidates the forward history, so `next` drains back
    /// onto `previous` first.
    async fn speak_random_phrase(&self, token: &CancellationToken) -> anyhow::Result<()> {
        if !self.aphorisms_enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let phrase = {
            let mut history = self.history.lock().unwrap();
            while let Some(item) = history.next.pop() {
                history.previous.push(item);
            }
            let picked = {
                let mut rng = self.rng.lock().unwrap();
                self.phrases.random_phrase(&mut *rng)
            };
            let Some(phrase) = picked else {
                debug!("no aphorisms loaded, skipping follow-up");
                return Ok(());
            };
            history.previous.push(phrase.clone());
            phrase
        };

        self.broadcast_and_speak(phrase, token).await
    }

    async fn broadcast_and_speak(
        &self,
        phrase: Phrase,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        debug!(
            chapter = phrase.chapter_number,
            "phrase picked: {}", phrase.text
        );
        let _ = self
            .events
            .send(AnnouncerEvent::PhrasePicked(phrase.clone()));
        if self.tts.speak(&phrase.text, token).await? == SpeakOutcome::Silenced {
            info!("phrase silenced");
        }
        Ok(())
    }

    fn spawn_broadcast_and_speak(self: &Arc<Self>, phrase: Phrase) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let token = this.silence.current();
            if let Err(e) = this.broadcast_and_speak(phrase, &token).await {
                error!(error = format!("{e:#}"), "phrase playback failed");
            }
        });
    }
}
