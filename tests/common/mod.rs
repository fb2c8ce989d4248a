#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use guild_jukebox::{
    audio::{
        pipeline::AudioPipeline,
        registry::{SessionRegistry, SessionSettings},
        session::GuildPlaybackSession,
        track::{QueuedTrack, TrackId, TrackOwnership, TrackSource},
    },
    ui::{Notice, NoticeKind, Notifier},
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

pub const GUILD: GuildId = GuildId::new(1);
pub const TEXT: ChannelId = ChannelId::new(10);
pub const VOICE: ChannelId = ChannelId::new(20);
pub const OTHER_VOICE: ChannelId = ChannelId::new(21);
pub const USER: UserId = UserId::new(100);
pub const BOT: UserId = UserId::new(999);

pub const DEFAULT_VOLUME: u16 = 50;
pub const MAX_VOLUME: u16 = 150;

/// Pipeline en memoria que registra cada orden recibida
#[derive(Default)]
pub struct FakePipeline {
    current: Mutex<Option<QueuedTrack>>,
    played: Mutex<Vec<String>>,
    stopped: Mutex<Vec<TrackId>>,
    paused_calls: Mutex<Vec<bool>>,
    volumes: Mutex<Vec<u16>>,
    failing: Mutex<HashSet<String>>,
    disconnected: AtomicBool,
    /// Veces que se pidió reproducir con otra pista todavía activa
    violations: AtomicUsize,
}

impl FakePipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, title: &str) {
        self.failing.lock().insert(title.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Simula que la pista actual terminó sola
    pub fn end_current(&self) -> Option<QueuedTrack> {
        self.current.lock().take()
    }

    pub fn current_title(&self) -> Option<String> {
        self.current.lock().as_ref().map(|t| t.title().to_string())
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    /// Pistas detenidas cuyo fin aún no se ha entregado
    pub fn take_stopped(&self) -> Vec<TrackId> {
        std::mem::take(&mut *self.stopped.lock())
    }

    pub fn paused_calls(&self) -> Vec<bool> {
        self.paused_calls.lock().clone()
    }

    pub fn volumes(&self) -> Vec<u16> {
        self.volumes.lock().clone()
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPipeline for FakePipeline {
    async fn play(&self, track: QueuedTrack) -> Result<()> {
        if self.failing.lock().contains(track.title()) {
            return Err(anyhow!("fuente no disponible"));
        }
        let mut current = self.current.lock();
        if current.is_some() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.played.lock().push(track.title().to_string());
        *current = Some(track);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(track) = self.current.lock().take() {
            self.stopped.lock().push(track.id);
        }
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        self.paused_calls.lock().push(paused);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

/// Notificador que guarda los avisos en memoria
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn texts(&self, kind: NoticeKind) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.text.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, channel_id: ChannelId, kind: NoticeKind, text: String) {
        self.notices.lock().push(Notice::new(channel_id, kind, text));
    }
}

pub fn owner() -> TrackOwnership {
    TrackOwnership::new(GUILD, TEXT, USER)
}

pub fn source(title: &str) -> TrackSource {
    TrackSource::new(title, format!("https://example.com/{title}"))
}

pub fn track(title: &str) -> QueuedTrack {
    QueuedTrack::new(source(title), owner())
}

pub fn stream(title: &str) -> QueuedTrack {
    QueuedTrack::new(source(title).as_stream(), owner())
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        default_volume: DEFAULT_VOLUME,
        max_volume: MAX_VOLUME,
    }
}

pub fn registry(notifier: Arc<RecordingNotifier>) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(settings(), notifier))
}

pub fn session(notifier: Arc<RecordingNotifier>) -> Arc<GuildPlaybackSession> {
    Arc::new(GuildPlaybackSession::new(
        GUILD,
        DEFAULT_VOLUME,
        MAX_VOLUME,
        notifier,
    ))
}

/// Sesión con un pipeline conectado al canal de voz
pub async fn connected_session() -> (
    Arc<GuildPlaybackSession>,
    Arc<FakePipeline>,
    Arc<RecordingNotifier>,
) {
    let notifier = RecordingNotifier::new();
    let session = session(notifier.clone());
    let pipeline = FakePipeline::new();
    session.attach_pipeline(VOICE, pipeline.clone()).await;
    (session, pipeline, notifier)
}
