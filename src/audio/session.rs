//! One playback session per guild.
//!
//! Every mutation of the queue, the now-playing slot and the pause flag goes
//! through a single async mutex owned by the session, so command handlers,
//! voice presence callbacks and pipeline callbacks can never start two tracks
//! at once or lose an advance. Transport commands (`play`, `stop`, ...) are
//! issued while the lock is held; user notices are collected and only sent
//! once it is released.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        pipeline::{AudioPipeline, TrackEndReason},
        queue::{MusicQueue, QueueInfo},
        track::{QueuedTrack, TrackId, TrackSource},
    },
    error::{MusicError, MusicResult},
    ui::{Notice, NoticeKind, Notifier},
};

/// Resultado de encolar una pista
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Empezó a sonar de inmediato
    Started,
    /// Quedó en espera en esta posición (1-based)
    Queued { position: usize },
    /// Se intentó reproducir y falló; el error ya se notificó
    FailedToStart,
}

/// Resultado de encolar una playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistOutcome {
    pub added: usize,
    pub started: bool,
}

/// Volumen anterior y nuevo, para responder al usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeChange {
    pub old: u16,
    pub new: u16,
}

/// Lo que detuvo `stop()`
#[derive(Debug, Clone)]
pub struct StopSummary {
    pub stopped: Option<TrackSource>,
    pub cleared: usize,
}

struct SessionState {
    queue: MusicQueue,
    paused: bool,
    volume: u16,
    pipeline: Option<Arc<dyn AudioPipeline>>,
    voice_channel: Option<ChannelId>,
    /// Pista cuyo fin pidió el usuario con `skip`
    skipping: Option<TrackId>,
}

pub struct GuildPlaybackSession {
    guild_id: GuildId,
    max_volume: u16,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SessionState>,
}

impl GuildPlaybackSession {
    pub fn new(
        guild_id: GuildId,
        default_volume: u16,
        max_volume: u16,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            guild_id,
            max_volume,
            notifier,
            state: Mutex::new(SessionState {
                queue: MusicQueue::new(),
                paused: false,
                volume: default_volume.min(max_volume),
                pipeline: None,
                voice_channel: None,
                skipping: None,
            }),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn max_volume(&self) -> u16 {
        self.max_volume
    }

    /// Encola una pista; si el reproductor está libre, empieza a sonar
    pub async fn enqueue(&self, track: QueuedTrack) -> MusicResult<EnqueueOutcome> {
        self.check_owner(&track)?;

        let mut notices = Vec::new();
        let outcome = {
            let mut state = self.state.lock().await;
            let id = track.id;
            let title = track.title().to_string();
            let channel_id = track.owner.channel_id;
            state.queue.push_back(track);

            if !state.paused && self.can_advance_locked(&state).await {
                self.advance_locked(&mut state, &mut notices).await;
            }

            if state.queue.current().is_some_and(|c| c.id == id) {
                EnqueueOutcome::Started
            } else if let Some(position) = state.queue.position_of(id) {
                notices.push(Notice::new(
                    channel_id,
                    NoticeKind::Success,
                    format!("➕ **{}** añadida a la cola (posición {})", title, position),
                ));
                EnqueueOutcome::Queued { position }
            } else {
                EnqueueOutcome::FailedToStart
            }
        };

        self.dispatch(notices);
        Ok(outcome)
    }

    /// Encola varias pistas con un único aviso de resumen
    pub async fn enqueue_playlist(
        &self,
        name: &str,
        tracks: Vec<QueuedTrack>,
    ) -> MusicResult<PlaylistOutcome> {
        for track in &tracks {
            self.check_owner(track)?;
        }
        let Some(channel_id) = tracks.first().map(|t| t.owner.channel_id) else {
            return Ok(PlaylistOutcome {
                added: 0,
                started: false,
            });
        };

        let mut notices = Vec::new();
        let outcome = {
            let mut state = self.state.lock().await;
            let added = tracks.len();
            for track in tracks {
                state.queue.push_back(track);
            }
            notices.push(Notice::new(
                channel_id,
                NoticeKind::Success,
                format!("📋 Añadidas {} canciones de **{}**", added, name),
            ));

            let started = if !state.paused && self.can_advance_locked(&state).await {
                self.advance_locked(&mut state, &mut notices).await.is_some()
            } else {
                false
            };
            PlaylistOutcome { added, started }
        };

        info!(
            "📋 Playlist '{}' encolada en guild {} ({} pistas)",
            name, self.guild_id, outcome.added
        );
        self.dispatch(notices);
        Ok(outcome)
    }

    /// Pasa a la siguiente pista de la cola (o queda en reposo si está vacía)
    pub async fn advance(&self) -> Option<QueuedTrack> {
        let mut notices = Vec::new();
        let started = {
            let mut state = self.state.lock().await;
            self.advance_locked(&mut state, &mut notices).await
        };
        self.dispatch(notices);
        started
    }

    /// Reacciona al fin de una pista reportado por el pipeline.
    ///
    /// Ends for a track that is no longer the current one are stale (the
    /// session already moved past it) and are ignored.
    pub async fn finish_track(&self, id: TrackId, reason: TrackEndReason) -> Option<QueuedTrack> {
        let mut notices = Vec::new();
        let started = {
            let mut state = self.state.lock().await;
            if state.queue.current().map(|t| t.id) != Some(id) {
                debug!(
                    "Fin obsoleto de la pista {} en guild {} ({:?}), ignorado",
                    id, self.guild_id, reason
                );
                return None;
            }

            let skipped = state.skipping == Some(id);
            if reason.may_start_next() || skipped {
                self.advance_locked(&mut state, &mut notices).await
            } else {
                debug!("⏹️ Pista {} detenida en guild {}", id, self.guild_id);
                state.queue.take_current();
                state.skipping = None;
                None
            }
        };
        self.dispatch(notices);
        started
    }

    /// Salta la pista actual; el avance llega con el fin que reporta el pipeline
    pub async fn skip_current(&self) -> Option<TrackSource> {
        let mut notices = Vec::new();
        let skipped = {
            let mut state = self.state.lock().await;
            let current = state.queue.current().cloned()?;
            let pipeline = state.pipeline.clone()?;

            state.skipping = Some(current.id);
            if let Err(e) = pipeline.stop().await {
                // El pipeline no va a confirmar el fin: avanzar aquí mismo
                warn!("Error al detener pista en guild {}: {:?}", self.guild_id, e);
                self.advance_locked(&mut state, &mut notices).await;
            }
            info!("⏭️ Saltando {} en guild {}", current.title(), self.guild_id);
            current.source
        };
        self.dispatch(notices);
        Some(skipped)
    }

    /// Vacía la cola sin tocar la pista actual
    pub async fn clear_queue(&self) -> usize {
        let removed = self.state.lock().await.queue.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada en guild {} ({} pistas)", self.guild_id, removed);
        }
        removed
    }

    /// Elimina la pista en `position` (1-based)
    pub async fn remove(&self, position: usize) -> Option<TrackSource> {
        self.state
            .lock()
            .await
            .queue
            .remove(position)
            .map(|t| t.source)
    }

    /// Detiene la reproducción y limpia la cola, sin avanzar
    pub async fn stop(&self) -> StopSummary {
        let mut state = self.state.lock().await;
        let cleared = state.queue.clear();
        state.skipping = None;
        let stopped = state.queue.take_current();

        if stopped.is_some() {
            if let Some(pipeline) = state.pipeline.clone() {
                if let Err(e) = pipeline.stop().await {
                    warn!("Error al detener pipeline en guild {}: {:?}", self.guild_id, e);
                }
            }
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        StopSummary {
            stopped: stopped.map(|t| t.source),
            cleared,
        }
    }

    /// Pausa; devuelve `false` si ya estaba pausada
    pub async fn pause(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.paused {
            return false;
        }
        state.paused = true;

        if state.queue.current().is_some() {
            if let Some(pipeline) = state.pipeline.clone() {
                if let Err(e) = pipeline.set_paused(true).await {
                    warn!("Error al pausar en guild {}: {:?}", self.guild_id, e);
                }
            }
        }
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        true
    }

    /// Reanuda; si no suena nada y hay cola, arranca la siguiente pista.
    /// Devuelve `false` si ya estaba activa.
    pub async fn resume(&self) -> bool {
        let mut notices = Vec::new();
        let was_paused = {
            let mut state = self.state.lock().await;
            let was_paused = std::mem::replace(&mut state.paused, false);

            if was_paused && state.queue.current().is_some() {
                if let Some(pipeline) = state.pipeline.clone() {
                    if let Err(e) = pipeline.set_paused(false).await {
                        warn!("Error al reanudar en guild {}: {:?}", self.guild_id, e);
                    }
                }
            }

            if state.queue.current().is_none()
                && !state.queue.is_empty()
                && self.can_advance_locked(&state).await
            {
                self.advance_locked(&mut state, &mut notices).await;
            }
            was_paused
        };

        if was_paused {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        self.dispatch(notices);
        was_paused
    }

    /// Ajusta el volumen, siempre dentro de `[0, max_volume]`
    pub async fn set_volume(&self, requested: i64) -> VolumeChange {
        let new = requested.clamp(0, i64::from(self.max_volume)) as u16;
        let mut state = self.state.lock().await;
        let old = std::mem::replace(&mut state.volume, new);

        if let Some(pipeline) = state.pipeline.clone() {
            if let Err(e) = pipeline.set_volume(new).await {
                warn!("Error al ajustar volumen en guild {}: {:?}", self.guild_id, e);
            }
        }
        debug!("🔊 Volumen en guild {}: {}% -> {}%", self.guild_id, old, new);
        VolumeChange { old, new }
    }

    /// Si una pista nueva puede sonar ya, en vez de esperar en la cola
    pub async fn can_advance_automatically(&self) -> bool {
        let state = self.state.lock().await;
        self.can_advance_locked(&state).await
    }

    /// Conecta el transporte de audio del canal de voz.
    ///
    /// A pipeline that is already attached is released first, exactly as in
    /// [`detach_pipeline`](Self::detach_pipeline): the track it was playing
    /// goes back to the head of the queue and restarts on the new one.
    pub async fn attach_pipeline(&self, channel_id: ChannelId, pipeline: Arc<dyn AudioPipeline>) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock().await;
            self.release_pipeline_locked(&mut state).await;

            if let Err(e) = pipeline.set_volume(state.volume).await {
                warn!("Error al aplicar volumen en guild {}: {:?}", self.guild_id, e);
            }
            state.pipeline = Some(pipeline);
            state.voice_channel = Some(channel_id);
            info!("🔊 Pipeline conectado en guild {} (canal {})", self.guild_id, channel_id);

            if state.queue.current().is_none()
                && !state.queue.is_empty()
                && !state.paused
                && self.can_advance_locked(&state).await
            {
                self.advance_locked(&mut state, &mut notices).await;
            }
        }
        self.dispatch(notices);
    }

    /// Desconecta el transporte; la pista interrumpida vuelve a la cabeza de la cola
    pub async fn detach_pipeline(&self) {
        let mut state = self.state.lock().await;
        if self.release_pipeline_locked(&mut state).await {
            info!("🔌 Pipeline desconectado en guild {}", self.guild_id);
        }
    }

    /// Cierre definitivo de la sesión (el bot dejó el servidor o se apaga)
    pub async fn shutdown(&self) {
        self.stop().await;
        self.detach_pipeline().await;
    }

    pub async fn now_playing(&self) -> Option<QueuedTrack> {
        self.state.lock().await.queue.current().cloned()
    }

    pub async fn queue_info(&self) -> QueueInfo {
        self.state.lock().await.queue.get_info()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.paused
    }

    pub async fn volume(&self) -> u16 {
        self.state.lock().await.volume
    }

    pub async fn voice_channel(&self) -> Option<ChannelId> {
        self.state.lock().await.voice_channel
    }

    /// Actualiza el canal si hay un pipeline conectado; `false` si no lo hay
    pub async fn set_voice_channel(&self, channel_id: ChannelId) -> bool {
        let mut state = self.state.lock().await;
        if state.pipeline.is_none() {
            return false;
        }
        state.voice_channel = Some(channel_id);
        true
    }

    /// Envía un aviso al canal que pidió la pista
    pub fn notify_owner(&self, track: &QueuedTrack, kind: NoticeKind, text: String) {
        self.notifier.notify(track.owner.channel_id, kind, text);
    }

    /// Suelta el pipeline actual. Requiere el lock tomado.
    async fn release_pipeline_locked(&self, state: &mut SessionState) -> bool {
        let Some(pipeline) = state.pipeline.take() else {
            return false;
        };
        state.voice_channel = None;
        state.skipping = None;

        if let Some(current) = state.queue.take_current() {
            if let Err(e) = pipeline.stop().await {
                debug!("Error al detener pipeline saliente: {:?}", e);
            }
            debug!("↩️ {} vuelve a la cabeza de la cola en guild {}", current.title(), self.guild_id);
            state.queue.push_front(current.requeued());
        }
        true
    }

    fn check_owner(&self, track: &QueuedTrack) -> MusicResult<()> {
        if track.owner.guild_id == self.guild_id {
            return Ok(());
        }
        error!(
            "❌ Pista '{}' de guild {} rechazada por la sesión de guild {}",
            track.title(),
            track.owner.guild_id,
            self.guild_id
        );
        Err(MusicError::InvalidTrack {
            title: track.title().to_string(),
            owner: track.owner.guild_id,
            session: self.guild_id,
        })
    }

    async fn can_advance_locked(&self, state: &SessionState) -> bool {
        let slot_free = state.queue.current().map_or(true, |c| c.source.is_stream());
        match &state.pipeline {
            Some(pipeline) => slot_free && pipeline.is_connected().await,
            None => false,
        }
    }

    /// Única transición del slot "now playing". Requiere el lock tomado.
    async fn advance_locked(
        &self,
        state: &mut SessionState,
        notices: &mut Vec<Notice>,
    ) -> Option<QueuedTrack> {
        state.skipping = None;
        let Some(pipeline) = state.pipeline.clone() else {
            debug!("Sin conexión de voz en guild {}, la cola espera", self.guild_id);
            return None;
        };

        if state.queue.take_current().is_some() {
            if let Err(e) = pipeline.stop().await {
                debug!("Error al detener la pista anterior: {:?}", e);
            }
        }

        while let Some(next) = state.queue.pop_next() {
            state.queue.set_current(next.clone());

            match pipeline.play(next.clone()).await {
                Ok(()) => {
                    if state.paused {
                        if let Err(e) = pipeline.set_paused(true).await {
                            warn!("Error al pausar pista nueva: {:?}", e);
                        }
                    }
                    info!("🎵 Reproduciendo {} en guild {}", next.title(), self.guild_id);
                    notices.push(Notice::new(
                        next.owner.channel_id,
                        NoticeKind::Info,
                        format!("🎵 Reproduciendo ahora: **{}**", next.title()),
                    ));
                    return Some(next);
                }
                Err(e) => {
                    warn!(
                        "❌ No se pudo iniciar {} en guild {}: {:?}",
                        next.title(),
                        self.guild_id,
                        e
                    );
                    state.queue.take_current();
                    notices.push(Notice::new(
                        next.owner.channel_id,
                        NoticeKind::Error,
                        format!("❌ No se pudo reproducir **{}**: {}", next.title(), e),
                    ));
                }
            }
        }

        info!("📭 Cola vacía en guild {}", self.guild_id);
        None
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            notice.send(self.notifier.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        pipeline::MockAudioPipeline,
        track::{TrackOwnership, TrackSource},
    };
    use mockall::predicate::eq;
    use serenity::model::id::UserId;

    struct SilentNotifier;

    impl Notifier for SilentNotifier {
        fn notify(&self, _channel_id: ChannelId, _kind: NoticeKind, _text: String) {}
    }

    fn session() -> GuildPlaybackSession {
        GuildPlaybackSession::new(GuildId::new(1), 50, 150, Arc::new(SilentNotifier))
    }

    fn track(title: &str) -> QueuedTrack {
        QueuedTrack::new(
            TrackSource::new(title, format!("https://example.com/{title}")),
            TrackOwnership::new(GuildId::new(1), ChannelId::new(10), UserId::new(100)),
        )
    }

    fn connected_mock() -> MockAudioPipeline {
        let mut pipeline = MockAudioPipeline::new();
        pipeline.expect_is_connected().returning(|| true);
        pipeline.expect_set_volume().returning(|_| Ok(()));
        pipeline.expect_play().returning(|_| Ok(()));
        pipeline.expect_stop().returning(|| Ok(()));
        pipeline
    }

    #[tokio::test]
    async fn test_pause_reaches_pipeline_once() {
        let mut pipeline = connected_mock();
        pipeline
            .expect_set_paused()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));

        let session = session();
        session
            .attach_pipeline(ChannelId::new(20), Arc::new(pipeline))
            .await;
        session.enqueue(track("a")).await.unwrap();

        assert!(session.pause().await);
        assert!(!session.pause().await);
        assert!(session.is_paused().await);
    }

    #[tokio::test]
    async fn test_enqueue_without_voice_only_queues() {
        let session = session();

        let outcome = session.enqueue(track("a")).await.unwrap();

        assert_eq!(outcome, EnqueueOutcome::Queued { position: 1 });
        assert!(session.now_playing().await.is_none());
        assert!(!session.can_advance_automatically().await);
    }

    #[tokio::test]
    async fn test_stream_allows_automatic_advance() {
        let session = session();
        session
            .attach_pipeline(ChannelId::new(20), Arc::new(connected_mock()))
            .await;

        let radio = QueuedTrack::new(
            TrackSource::new("radio", "https://example.com/radio").as_stream(),
            TrackOwnership::new(GuildId::new(1), ChannelId::new(10), UserId::new(100)),
        );
        session.enqueue(radio).await.unwrap();
        assert!(session.can_advance_automatically().await);

        let outcome = session.enqueue(track("song")).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Started);
        assert!(!session.can_advance_automatically().await);
    }

    #[tokio::test]
    async fn test_stopped_end_without_skip_does_not_advance() {
        let session = session();
        session
            .attach_pipeline(ChannelId::new(20), Arc::new(connected_mock()))
            .await;
        let first = track("a");
        let first_id = first.id;
        session.enqueue(first).await.unwrap();
        session.enqueue(track("b")).await.unwrap();

        let started = session.finish_track(first_id, TrackEndReason::Stopped).await;

        assert!(started.is_none());
        assert!(session.now_playing().await.is_none());
        assert_eq!(session.queue_info().await.total_items, 1);
    }
}
