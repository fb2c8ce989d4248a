//! Songbird track events bridged onto [`PlaybackEventSink`].

use parking_lot::Mutex;
use serenity::async_trait;
use songbird::{
    events::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler},
    tracks::PlayMode,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::audio::{events::PlaybackEventSink, pipeline::TrackEndReason, track::QueuedTrack};

/// Cada cuánto se revisa si la pista avanza
pub const STUCK_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Tiempo sin avanzar a partir del cual la pista se considera atascada
pub const STUCK_THRESHOLD: Duration = Duration::from_secs(15);
/// Tiempo atascada tras el cual se detiene la pista para que la cola siga
pub const STUCK_ABANDON_AFTER: Duration = Duration::from_secs(45);

/// Handler para el fin de un track
pub struct TrackEndHandler {
    pub sink: PlaybackEventSink,
    pub track: QueuedTrack,
    /// Marcado cuando el fin lo pidió `stop()`
    pub stopping: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let reason = if self.stopping.load(Ordering::Acquire) {
            TrackEndReason::Stopped
        } else {
            TrackEndReason::Finished
        };
        self.sink.on_track_end(self.track.id, reason).await;
        None
    }
}

/// Handler para errores de tracks: avisa y da la pista por terminada
pub struct TrackErrorHandler {
    pub sink: PlaybackEventSink,
    pub track: QueuedTrack,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut message = "no se pudo cargar el audio".to_string();
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    message = e.to_string();
                }
            }
        }

        self.sink.on_track_exception(&self.track, &message);
        // Songbird no emite End para pistas con error
        self.sink
            .on_track_end(self.track.id, TrackEndReason::LoadFailed)
            .await;
        None
    }
}

/// Handler para cuando un track comienza
pub struct TrackStartHandler {
    pub sink: PlaybackEventSink,
    pub track: QueuedTrack,
}

#[async_trait]
impl VoiceEventHandler for TrackStartHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        self.sink.on_track_start(&self.track);
        None
    }
}

/// Detecta pistas que dejan de avanzar mientras deberían estar sonando
pub struct StuckWatchdog {
    pub sink: PlaybackEventSink,
    pub track: QueuedTrack,
    pub tracker: Mutex<StallTracker>,
}

impl StuckWatchdog {
    pub fn new(sink: PlaybackEventSink, track: QueuedTrack) -> Self {
        Self {
            sink,
            track,
            tracker: Mutex::new(StallTracker::new(STUCK_THRESHOLD, STUCK_ABANDON_AFTER)),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for StuckWatchdog {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let EventContext::Track(track_list) = ctx else {
            return None;
        };
        for (state, handle) in *track_list {
            let playing = matches!(state.playing, PlayMode::Play);
            let status = self
                .tracker
                .lock()
                .observe(state.position, playing, Instant::now());
            match status {
                StallStatus::Healthy => {}
                StallStatus::Stuck => self.sink.on_track_stuck(&self.track, STUCK_THRESHOLD),
                StallStatus::Abandon => {
                    // El fin que dispara stop() avanza la cola
                    warn!("⏭️ Abandonando pista atascada {} ({})", self.track.id, self.track.title());
                    if let Err(e) = handle.stop() {
                        debug!("No se pudo detener la pista atascada: {:?}", e);
                    }
                }
            }
        }
        None
    }
}

/// Resultado de una muestra del watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallStatus {
    Healthy,
    /// Cruzó el umbral de aviso (una vez por atasco)
    Stuck,
    /// Lleva demasiado atascada: hay que detenerla (una vez por atasco)
    Abandon,
}

/// Estado del watchdog; avisa y abandona una sola vez por atasco
#[derive(Debug)]
pub struct StallTracker {
    threshold: Duration,
    abandon_after: Duration,
    last_position: Option<Duration>,
    stalled_since: Option<Instant>,
    reported: bool,
    abandoned: bool,
}

impl StallTracker {
    pub fn new(threshold: Duration, abandon_after: Duration) -> Self {
        Self {
            threshold,
            abandon_after: abandon_after.max(threshold),
            last_position: None,
            stalled_since: None,
            reported: false,
            abandoned: false,
        }
    }

    /// Registra una muestra de posición
    pub fn observe(&mut self, position: Duration, playing: bool, now: Instant) -> StallStatus {
        let moved = self.last_position != Some(position);
        self.last_position = Some(position);

        if !playing || moved {
            if self.reported {
                debug!("Pista vuelve a avanzar en {:?}", position);
            }
            self.stalled_since = None;
            self.reported = false;
            self.abandoned = false;
            return StallStatus::Healthy;
        }

        let stalled_for = now.duration_since(*self.stalled_since.get_or_insert(now));
        if !self.abandoned && stalled_for >= self.abandon_after {
            self.reported = true;
            self.abandoned = true;
            return StallStatus::Abandon;
        }
        if !self.reported && stalled_for >= self.threshold {
            self.reported = true;
            return StallStatus::Stuck;
        }
        StallStatus::Healthy
    }
}
