//! [`AudioPipeline`] over a songbird voice call.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    events::{Event, TrackEvent},
    input::YoutubeDl,
    tracks::TrackHandle,
    Call,
};
use std::sync::{
    atomic::{AtomicBool, AtomicU16, Ordering},
    Arc,
};
use tracing::debug;

use super::events::{
    StuckWatchdog, TrackEndHandler, TrackErrorHandler, TrackStartHandler, STUCK_CHECK_INTERVAL,
};
use crate::audio::{events::PlaybackEventSink, pipeline::AudioPipeline, track::QueuedTrack};

struct ActiveTrack {
    handle: TrackHandle,
    stopping: Arc<AtomicBool>,
}

/// Pipeline de un servidor: reproduce con yt-dlp a través de songbird
pub struct SongbirdPipeline {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    sink: PlaybackEventSink,
    current: Mutex<Option<ActiveTrack>>,
    volume: AtomicU16,
}

impl SongbirdPipeline {
    pub fn new(
        guild_id: GuildId,
        call: Arc<tokio::sync::Mutex<Call>>,
        http: reqwest::Client,
        sink: PlaybackEventSink,
    ) -> Self {
        Self {
            guild_id,
            call,
            http,
            sink,
            current: Mutex::new(None),
            volume: AtomicU16::new(100),
        }
    }

    fn register_events(
        &self,
        handle: &TrackHandle,
        track: &QueuedTrack,
        stopping: Arc<AtomicBool>,
    ) -> Result<()> {
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    sink: self.sink.clone(),
                    track: track.clone(),
                    stopping,
                },
            )
            .context("Error al agregar handler de fin")?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    sink: self.sink.clone(),
                    track: track.clone(),
                },
            )
            .context("Error al agregar handler de errores")?;
        handle
            .add_event(
                Event::Track(TrackEvent::Play),
                TrackStartHandler {
                    sink: self.sink.clone(),
                    track: track.clone(),
                },
            )
            .context("Error al agregar handler de inicio")?;
        handle
            .add_event(
                Event::Periodic(STUCK_CHECK_INTERVAL, None),
                StuckWatchdog::new(self.sink.clone(), track.clone()),
            )
            .context("Error al agregar watchdog")?;
        Ok(())
    }

    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|t| t.handle.clone())
    }
}

fn volume_scale(volume: u16) -> f32 {
    f32::from(volume) / 100.0
}

#[async_trait]
impl AudioPipeline for SongbirdPipeline {
    async fn play(&self, track: QueuedTrack) -> Result<()> {
        let input = YoutubeDl::new(self.http.clone(), track.source.uri().to_string());
        let handle = self.call.lock().await.play_input(input.into());

        let stopping = Arc::new(AtomicBool::new(false));
        if let Err(e) = self.register_events(&handle, &track, stopping.clone()) {
            let _ = handle.stop();
            return Err(e);
        }
        handle
            .set_volume(volume_scale(self.volume.load(Ordering::Relaxed)))
            .context("Error al aplicar volumen")?;

        debug!("🎵 Pista {} enviada a songbird en guild {}", track.id, self.guild_id);
        let previous = self.current.lock().replace(ActiveTrack { handle, stopping });
        if let Some(previous) = previous {
            previous.stopping.store(true, Ordering::Release);
            let _ = previous.handle.stop();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(active) = self.current.lock().take() else {
            return Ok(());
        };
        active.stopping.store(true, Ordering::Release);
        active.handle.stop().context("Error al detener la pista")?;
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.volume.store(volume, Ordering::Relaxed);
        if let Some(handle) = self.current_handle() {
            handle
                .set_volume(volume_scale(volume))
                .context("Error al ajustar volumen")?;
        }
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        if paused {
            handle.pause().context("Error al pausar")?;
        } else {
            handle.play().context("Error al reanudar")?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }
}
