use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::track::QueuedTrack;

/// Transporte de audio de un servidor (decodificación, Opus, conexión de voz).
///
/// Implementations report lifecycle events back through a
/// [`PlaybackEventSink`](super::events::PlaybackEventSink). Those callbacks
/// may arrive on any task and must not be delivered from inside one of
/// these calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    /// Empieza a reproducir la pista
    async fn play(&self, track: QueuedTrack) -> Result<()>;

    /// Detiene la pista actual, si hay alguna
    async fn stop(&self) -> Result<()>;

    /// Volumen en porcentaje, ya limitado por la sesión
    async fn set_volume(&self, volume: u16) -> Result<()>;

    async fn set_paused(&self, paused: bool) -> Result<()>;

    /// Si la conexión de voz sigue activa
    async fn is_connected(&self) -> bool;
}

/// Por qué terminó una pista
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the queue may move on without anyone asking for it.
    pub fn may_start_next(self) -> bool {
        !matches!(self, TrackEndReason::Stopped)
    }
}
