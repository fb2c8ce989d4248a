//! # UI Module
//!
//! User-facing output. The playback core only knows the [`Notifier`]
//! trait; [`embeds`] renders notices and search lists as Discord embeds.

use serenity::model::id::ChannelId;

pub mod embeds;

/// Tipo de aviso, determina el color del embed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Envío de avisos "fire-and-forget" a un canal de texto.
///
/// Delivery failures are the implementation's problem to log.
pub trait Notifier: Send + Sync {
    fn notify(&self, channel_id: ChannelId, kind: NoticeKind, text: String);
}

/// Aviso pendiente de enviar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub channel_id: ChannelId,
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn new(channel_id: ChannelId, kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            channel_id,
            kind,
            text: text.into(),
        }
    }

    pub fn send(self, notifier: &dyn Notifier) {
        notifier.notify(self.channel_id, self.kind, self.text);
    }
}
