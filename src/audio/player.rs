use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        registry::SessionRegistry,
        selection::{PendingSelection, PendingSelectionRegistry, SelectionOutcome},
        session::{EnqueueOutcome, GuildPlaybackSession, PlaylistOutcome},
        track::{QueuedTrack, TrackOwnership},
    },
    error::{MusicError, MusicResult},
    sources::{is_url, Resolution, TrackResolver},
    ui::{NoticeKind, Notifier},
};

/// Qué pasó con el resultado de una resolución
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    Enqueued(EnqueueOutcome),
    Playlist(PlaylistOutcome),
    /// Varios candidatos esperando a que el usuario elija
    SelectionPending(PendingSelection),
}

/// Qué hacer con una búsqueda por texto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// `play`: suena el primer resultado
    FirstMatch,
    /// `search`: el usuario elige de la lista
    Choose,
}

/// Selección aplicada: lo elegido, lo rechazado y cómo quedó cada pista
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub selection: SelectionOutcome,
    pub enqueued: Vec<EnqueueOutcome>,
}

/// Punto de entrada de los comandos al motor de reproducción.
///
/// Routes resolver results to the owning guild's session or to the pending
/// selection registry, and ties session lifetime to guild availability.
pub struct AudioPlayer {
    sessions: Arc<SessionRegistry>,
    selections: Arc<PendingSelectionRegistry>,
    notifier: Arc<dyn Notifier>,
    selection_ttl: Duration,
}

impl AudioPlayer {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        selections: Arc<PendingSelectionRegistry>,
        notifier: Arc<dyn Notifier>,
        selection_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            selections,
            notifier,
            selection_ttl,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn selections(&self) -> &Arc<PendingSelectionRegistry> {
        &self.selections
    }

    pub fn session(&self, guild_id: GuildId) -> MusicResult<Arc<GuildPlaybackSession>> {
        self.sessions
            .get(guild_id)
            .ok_or(MusicError::NoSession(guild_id))
    }

    /// El bot ve el servidor (ready / guild_create)
    pub fn guild_available(&self, guild_id: GuildId) -> Arc<GuildPlaybackSession> {
        self.sessions.insert(guild_id)
    }

    /// El bot dejó el servidor: se cierra la sesión y sus selecciones
    pub async fn guild_unavailable(&self, guild_id: GuildId) {
        if let Some(session) = self.sessions.remove(guild_id) {
            session.shutdown().await;
        }
        let dropped = self.selections.clear_guild(guild_id);
        if dropped > 0 {
            debug!("{} selecciones descartadas en guild {}", dropped, guild_id);
        }
    }

    /// Resuelve la consulta y entrega el resultado a la sesión.
    ///
    /// In [`QueryMode::FirstMatch`] a free-text search enqueues its first
    /// candidate directly; URLs always keep whatever the resolver returned.
    pub async fn resolve_query(
        &self,
        resolver: &dyn TrackResolver,
        owner: TrackOwnership,
        query: &str,
        mode: QueryMode,
    ) -> MusicResult<ResolutionOutcome> {
        let resolution = match resolver.resolve(query).await {
            Resolution::Search(candidates) if mode == QueryMode::FirstMatch && !is_url(query) => {
                candidates
                    .into_iter()
                    .next()
                    .map_or(Resolution::NoMatches, Resolution::Track)
            }
            other => other,
        };
        self.handle_resolution(owner, resolution).await
    }

    /// Adjunta la propiedad a lo resuelto y lo encola o lo deja pendiente.
    ///
    /// Resolution failures are reported to the owner's channel here; the
    /// returned error is only for the caller's control flow.
    pub async fn handle_resolution(
        &self,
        owner: TrackOwnership,
        resolution: Resolution,
    ) -> MusicResult<ResolutionOutcome> {
        let session = self.session(owner.guild_id)?;

        if let Some(track) = resolution.selected_track() {
            debug!("Playlist con pista elegida, se encola solo {}", track.title());
            let queued = QueuedTrack::new(track.clone(), owner);
            return Ok(ResolutionOutcome::Enqueued(session.enqueue(queued).await?));
        }

        match resolution {
            Resolution::Track(source) => {
                let outcome = session.enqueue(QueuedTrack::new(source, owner)).await?;
                Ok(ResolutionOutcome::Enqueued(outcome))
            }
            Resolution::Playlist { name, tracks, .. } => {
                let queued = tracks
                    .into_iter()
                    .map(|source| QueuedTrack::new(source, owner))
                    .collect();
                let outcome = session.enqueue_playlist(&name, queued).await?;
                Ok(ResolutionOutcome::Playlist(outcome))
            }
            Resolution::Search(candidates) => {
                let pending = self.selections.register(
                    owner.guild_id,
                    owner.user_id,
                    candidates,
                    self.selection_ttl,
                );
                if pending.candidates.is_empty() {
                    self.selections.remove(owner.guild_id, owner.user_id);
                    return Err(self.resolution_failed(owner, "no se encontraron resultados"));
                }
                Ok(ResolutionOutcome::SelectionPending(pending))
            }
            Resolution::NoMatches => {
                Err(self.resolution_failed(owner, "no se encontraron resultados"))
            }
            Resolution::Failed(reason) => Err(self.resolution_failed(owner, &reason)),
        }
    }

    /// Aplica la elección numérica del usuario sobre su búsqueda pendiente
    pub async fn select(
        &self,
        owner: TrackOwnership,
        indices: &[i64],
    ) -> MusicResult<SelectionResult> {
        let session = self.session(owner.guild_id)?;
        let selection = self
            .selections
            .resolve(owner.guild_id, owner.user_id, indices)?;

        let mut enqueued = Vec::with_capacity(selection.selected.len());
        for source in &selection.selected {
            let queued = QueuedTrack::new(source.clone(), owner);
            enqueued.push(session.enqueue(queued).await?);
        }

        if !selection.rejected.is_empty() {
            let reasons: Vec<String> = selection.rejected.iter().map(|r| r.to_string()).collect();
            self.notifier.notify(
                owner.channel_id,
                NoticeKind::Warning,
                format!("⚠️ Selección no válida: {}", reasons.join(", ")),
            );
        }

        info!(
            "✅ {} pistas elegidas por {} en guild {} ({} rechazos)",
            selection.selected.len(),
            owner.user_id,
            owner.guild_id,
            selection.rejected.len()
        );
        Ok(SelectionResult {
            selection,
            enqueued,
        })
    }

    /// Apagado del proceso
    pub async fn shutdown(&self) {
        self.sessions.shutdown_all().await;
    }

    fn resolution_failed(&self, owner: TrackOwnership, reason: &str) -> MusicError {
        warn!("⚠️ Resolución fallida en guild {}: {}", owner.guild_id, reason);
        self.notifier.notify(
            owner.channel_id,
            NoticeKind::Warning,
            format!("⚠️ No se pudo cargar la canción: {}", reason),
        );
        MusicError::Resolution(reason.to_string())
    }
}
