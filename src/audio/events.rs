use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{debug, error, info, warn};

use super::{
    pipeline::TrackEndReason,
    session::GuildPlaybackSession,
    track::{QueuedTrack, TrackId},
};
use crate::{error::MusicError, ui::NoticeKind};

/// Traduce los callbacks del pipeline en transiciones de la sesión y avisos.
///
/// Holds a weak reference: the session owns the pipeline, and the pipeline
/// owns its sink, so a strong one would keep torn-down sessions alive.
#[derive(Clone)]
pub struct PlaybackEventSink {
    session: Weak<GuildPlaybackSession>,
}

impl PlaybackEventSink {
    pub fn new(session: &Arc<GuildPlaybackSession>) -> Self {
        Self {
            session: Arc::downgrade(session),
        }
    }

    pub fn on_track_start(&self, track: &QueuedTrack) {
        info!("▶️ Pista {} empezó: {}", track.id, track.title());
    }

    /// Fin de pista: avanza la cola si corresponde
    pub async fn on_track_end(&self, id: TrackId, reason: TrackEndReason) -> Option<QueuedTrack> {
        let Some(session) = self.session.upgrade() else {
            debug!("Fin de pista {} para una sesión ya cerrada", id);
            return None;
        };
        debug!("🎵 Pista {} terminó en guild {} ({:?})", id, session.guild_id(), reason);
        session.finish_track(id, reason).await
    }

    /// Error durante la reproducción; no avanza, espera el fin del pipeline
    pub fn on_track_exception(&self, track: &QueuedTrack, message: &str) {
        let error = MusicError::Playback(format!("**{}**: {}", track.title(), message));
        error!("❌ Pista {} en guild {}: {}", track.id, track.owner.guild_id, error);
        if let Some(session) = self.session.upgrade() {
            session.notify_owner(track, NoticeKind::Error, format!("❌ {}", error));
        }
    }

    /// La pista dejó de avanzar; no avanza, espera el fin del pipeline
    pub fn on_track_stuck(&self, track: &QueuedTrack, threshold: Duration) {
        warn!(
            "⚠️ Pista {} ({}) atascada más de {}",
            track.id,
            track.title(),
            humantime::format_duration(threshold)
        );
        if let Some(session) = self.session.upgrade() {
            session.notify_owner(
                track,
                NoticeKind::Warning,
                format!(
                    "⚠️ **{}** lleva {} sin avanzar",
                    track.title(),
                    humantime::format_duration(threshold)
                ),
            );
        }
    }
}
