//! Sound-effect playback through rodio.
//!
//! Every cue gets its own sink, so overlapping announcements never fight
//! over a shared player. A cue returns immediately; a blocking poll loop
//! watches for completion or a silence request, the same way speech playback
//! is cancelled.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Cuckoo,
    Horn,
    Bells,
    Pistol,
    Rooster1,
    Rooster2,
    Woodpecker,
}

impl SoundCue {
    pub fn file_name(self) -> &'static str {
        match self {
            SoundCue::Cuckoo => "cuckoo.wav",
            SoundCue::Horn => "horn.wav",
            SoundCue::Bells => "bells.wav",
            SoundCue::Pistol => "pistol.wav",
            SoundCue::Rooster1 => "rooster1.wav",
            SoundCue::Rooster2 => "rooster2.wav",
            SoundCue::Woodpecker => "woodpecker.wav",
        }
    }
}

pub trait SoundPlayer: Send + Sync {
    /// Cue a sound and return immediately; playback stops when `cancel` fires.
    fn cue(&self, cue: SoundCue, cancel: CancellationToken);
}

#[derive(Debug, thiserror::Error)]
#[error("failed to open audio output: {0}")]
pub struct AudioError(String);

/// Plays WAV cues from a directory through the default output device.
pub struct RodioSoundBank {
    dir: PathBuf,
    stream: OutputStream,
}

impl RodioSoundBank {
    pub fn open(dir: &Path) -> Result<Self, AudioError> {
        let stream =
            OutputStreamBuilder::open_default_stream().map_err(|e| AudioError(e.to_string()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stream,
        })
    }
}

impl SoundPlayer for RodioSoundBank {
    fn cue(&self, cue: SoundCue, cancel: CancellationToken) {
        let path = self.dir.join(cue.file_name());
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("missing sound {}: {e}", path.display());
                return;
            }
        };
        let source = match Decoder::new(BufReader::new(file)) {
            Ok(s) => s,
            Err(e) => {
                warn!("undecodable sound {}: {e}", path.display());
                return;
            }
        };

        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(source);
        debug!("cued {:?}", cue);

        // Poll off the async runtime until the cue drains or silence fires.
        tokio::task::spawn_blocking(move || loop {
            if sink.empty() {
                return;
            }
            if cancel.is_cancelled() {
                sink.stop();
                info!("sound cue silenced");
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        });
    }
}

/// Stand-in player used when no audio device is available; cues are logged
/// and dropped so announcements still speak.
pub struct SilentSoundBank;

impl SoundPlayer for SilentSoundBank {
    fn cue(&self, cue: SoundCue, _cancel: CancellationToken) {
        debug!("no audio output, dropping cue {:?}", cue);
    }
}
