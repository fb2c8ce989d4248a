//! Automatic pause/resume from voice channel presence.
//!
//! The bot pauses while nobody but bots remain in its voice channel and
//! resumes once a listener is back. Decisions are pure functions of one
//! membership event plus the bot's current channel; applying them goes
//! through the session's own idempotent `pause`/`resume`.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Cambio de presencia en un canal de voz, con la ocupación resultante
/// (miembros que no son bots)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceMembershipEvent {
    Joined {
        guild_id: GuildId,
        channel_id: ChannelId,
        member_id: UserId,
        occupancy: usize,
    },
    Left {
        guild_id: GuildId,
        channel_id: ChannelId,
        member_id: UserId,
        occupancy: usize,
    },
    Moved {
        guild_id: GuildId,
        member_id: UserId,
        from: ChannelId,
        to: ChannelId,
        from_occupancy: usize,
        to_occupancy: usize,
    },
}

impl VoiceMembershipEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Joined { guild_id, .. }
            | Self::Left { guild_id, .. }
            | Self::Moved { guild_id, .. } => *guild_id,
        }
    }

    pub fn member_id(&self) -> UserId {
        match self {
            Self::Joined { member_id, .. }
            | Self::Left { member_id, .. }
            | Self::Moved { member_id, .. } => *member_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceDecision {
    Pause,
    Resume,
    Ignore,
}

pub struct VoiceActivityController {
    sessions: Arc<SessionRegistry>,
    bot_user: OnceLock<UserId>,
}

impl VoiceActivityController {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            bot_user: OnceLock::new(),
        }
    }

    /// Se fija una vez, en `ready`
    pub fn set_bot_user(&self, user_id: UserId) {
        if self.bot_user.set(user_id).is_err() {
            debug!("Usuario del bot ya configurado");
        }
    }

    pub fn bot_user(&self) -> Option<UserId> {
        self.bot_user.get().copied()
    }

    /// Decide qué hacer con un evento dado el canal actual del bot
    pub fn decide(&self, event: &VoiceMembershipEvent, bot_channel: Option<ChannelId>) -> VoiceDecision {
        let is_bot = self.bot_user() == Some(event.member_id());

        match *event {
            VoiceMembershipEvent::Joined {
                channel_id,
                occupancy,
                ..
            } => {
                let in_bot_channel = is_bot || bot_channel == Some(channel_id);
                if in_bot_channel && occupancy >= 1 {
                    VoiceDecision::Resume
                } else {
                    VoiceDecision::Ignore
                }
            }
            VoiceMembershipEvent::Left {
                channel_id,
                occupancy,
                ..
            } => {
                if is_bot || (bot_channel == Some(channel_id) && occupancy == 0) {
                    VoiceDecision::Pause
                } else {
                    VoiceDecision::Ignore
                }
            }
            VoiceMembershipEvent::Moved {
                from,
                to,
                from_occupancy,
                to_occupancy,
                ..
            } => {
                if from == to {
                    return VoiceDecision::Ignore;
                }
                if is_bot {
                    // El bot solo mira el canal al que llegó
                    return if to_occupancy >= 1 {
                        VoiceDecision::Resume
                    } else {
                        VoiceDecision::Pause
                    };
                }
                if bot_channel == Some(from) && from_occupancy == 0 {
                    VoiceDecision::Pause
                } else if bot_channel == Some(to) && to_occupancy >= 1 {
                    VoiceDecision::Resume
                } else {
                    VoiceDecision::Ignore
                }
            }
        }
    }

    /// Aplica el evento a la sesión del servidor, si existe
    pub async fn handle(&self, event: VoiceMembershipEvent) -> VoiceDecision {
        let guild_id = event.guild_id();
        let Some(session) = self.sessions.get(guild_id) else {
            debug!("Evento de voz para guild {} sin sesión", guild_id);
            return VoiceDecision::Ignore;
        };

        let is_bot = self.bot_user() == Some(event.member_id());
        if let (true, VoiceMembershipEvent::Moved { to, .. }) = (is_bot, event) {
            session.set_voice_channel(to).await;
        }

        let bot_channel = session.voice_channel().await;
        let decision = self.decide(&event, bot_channel);
        match decision {
            VoiceDecision::Pause => {
                if session.pause().await {
                    info!("🔇 Canal de voz sin oyentes en guild {}, pausando", guild_id);
                }
            }
            VoiceDecision::Resume => {
                if session.resume().await {
                    info!("👂 Hay oyentes de nuevo en guild {}, reanudando", guild_id);
                }
            }
            VoiceDecision::Ignore => {}
        }
        decision
    }
}
