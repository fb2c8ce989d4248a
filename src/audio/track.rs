use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Pista resuelta y reproducible, inmutable una vez creada
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSource {
    title: String,
    uri: String,
    author: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    is_stream: bool,
}

impl TrackSource {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
            author: None,
            duration: None,
            thumbnail: None,
            is_stream: false,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn uri(&self) -> &str {
        &self.uri
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn is_stream(&self) -> bool {
        self.is_stream
    }

    // Setters
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn as_stream(mut self) -> Self {
        self.is_stream = true;
        self
    }
}

/// Quién pidió la pista y dónde hay que responderle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackOwnership {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

impl TrackOwnership {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            guild_id,
            channel_id,
            user_id,
        }
    }
}

/// Identificador único por proceso de cada pista encolada.
///
/// Two enqueues of the same source get distinct ids, so end callbacks can
/// always be matched to the exact queue entry that started playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pista con dueño: la única forma en que una pista entra a una cola.
#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub id: TrackId,
    pub source: TrackSource,
    pub owner: TrackOwnership,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(source: TrackSource, owner: TrackOwnership) -> Self {
        Self {
            id: TrackId::next(),
            source,
            owner,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        self.source.title()
    }

    /// Misma pista con un id nuevo, para volver a la cola tras una interrupción.
    ///
    /// Late end events from the pipeline that was playing it still carry the
    /// old id and are treated as stale.
    pub fn requeued(mut self) -> Self {
        self.id = TrackId::next();
        self
    }
}
