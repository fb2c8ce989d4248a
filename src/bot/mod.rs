//! # Bot Module
//!
//! Discord side of Guild Jukebox.
//!
//! - [`JukeboxBot`] implements serenity's [`EventHandler`]: guild lifecycle,
//!   prefix commands, selection reactions and voice presence
//! - [`handlers`] holds the command implementations
//! - [`voice`] adapts a songbird call to the playback core's pipeline
//! - [`events`] bridges songbird track events to the playback event sink
//! - [`permissions`] gates disruptive commands behind a DJ role

use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Message, Reaction, ReactionType, Ready,
        UnavailableGuild, VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod events;
pub mod handlers;
pub mod permissions;
pub mod voice;

use crate::{
    audio::{
        player::AudioPlayer,
        track::TrackOwnership,
        voice_activity::{VoiceActivityController, VoiceMembershipEvent},
    },
    config::Config,
    sources::TrackResolver,
    ui::embeds::number_emoji_index,
};
use permissions::PermissionGate;

/// Handler principal de eventos de Discord
pub struct JukeboxBot {
    pub(crate) config: Arc<Config>,
    pub(crate) player: Arc<AudioPlayer>,
    pub(crate) voice: Arc<VoiceActivityController>,
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) permissions: Arc<dyn PermissionGate>,
    /// Cliente HTTP compartido por las entradas de yt-dlp
    pub(crate) http_client: reqwest::Client,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        player: Arc<AudioPlayer>,
        resolver: Arc<dyn TrackResolver>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        let voice = Arc::new(VoiceActivityController::new(player.sessions().clone()));
        Self {
            config,
            player,
            voice,
            resolver,
            permissions,
            http_client: reqwest::Client::new(),
        }
    }
}

/// Miembros que no son bots en un canal de voz, según la caché
fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };
    guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(channel_id))
        .filter(|vs| {
            let is_bot = vs
                .member
                .as_ref()
                .map(|m| m.user.bot)
                .or_else(|| guild.members.get(&vs.user_id).map(|m| m.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count()
}

/// Traduce un cambio de estado de voz a un evento de presencia
fn membership_event(
    ctx: &Context,
    old: Option<&VoiceState>,
    new: &VoiceState,
) -> Option<VoiceMembershipEvent> {
    let guild_id = new.guild_id?;
    let member_id = new.user_id;

    match (old.and_then(|o| o.channel_id), new.channel_id) {
        (None, Some(channel_id)) => Some(VoiceMembershipEvent::Joined {
            guild_id,
            channel_id,
            member_id,
            occupancy: listeners_in(ctx, guild_id, channel_id),
        }),
        (Some(channel_id), None) => Some(VoiceMembershipEvent::Left {
            guild_id,
            channel_id,
            member_id,
            occupancy: listeners_in(ctx, guild_id, channel_id),
        }),
        (Some(from), Some(to)) if from != to => Some(VoiceMembershipEvent::Moved {
            guild_id,
            member_id,
            from,
            to,
            from_occupancy: listeners_in(ctx, guild_id, from),
            to_occupancy: listeners_in(ctx, guild_id, to),
        }),
        // Mute, deafen, etc.
        _ => None,
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.voice.set_bot_user(ready.user.id);
        for guild in &ready.guilds {
            self.player.guild_available(guild.id);
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        // `ready` ya pudo crear la sesión; insertar es idempotente
        if self.player.sessions().get(guild.id).is_none() {
            self.player.guild_available(guild.id);
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }
        info!("👋 El bot salió de la guild {}", incomplete.id);
        self.player.guild_unavailable(incomplete.id).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando mensaje: {:?}", e);
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };
        if Some(user_id) == self.voice.bot_user() {
            return;
        }
        let ReactionType::Unicode(emoji) = &reaction.emoji else {
            return;
        };
        let Some(index) = number_emoji_index(emoji) else {
            return;
        };

        // Solo cuenta la reacción del dueño sobre su propia lista
        let is_own_prompt = self
            .player
            .selections()
            .get(guild_id, user_id)
            .and_then(|pending| pending.prompt)
            .is_some_and(|prompt| prompt.message_id == reaction.message_id);
        let roles = reaction
            .member
            .as_ref()
            .map(|m| m.roles.clone())
            .unwrap_or_default();
        let author = handlers::member_author(&ctx, guild_id, user_id, roles);
        if !handlers::accepts_selection(self.permissions.as_ref(), &author, is_own_prompt) {
            return;
        }

        debug!("Reacción {} de {} en guild {}", emoji, user_id, guild_id);
        let owner = TrackOwnership::new(guild_id, reaction.channel_id, user_id);
        if let Err(e) = handlers::handle_reaction_selection(&ctx, owner, index, self).await {
            error!("Error manejando reacción: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(event) = membership_event(&ctx, old.as_ref(), &new) else {
            return;
        };
        let decision = self.voice.handle(event).await;
        debug!("Evento de voz {:?} -> {:?}", event, decision);

        // El bot fue desconectado: la sesión pierde su pipeline
        if let VoiceMembershipEvent::Left { guild_id, member_id, .. } = event {
            if Some(member_id) == self.voice.bot_user() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if let Some(session) = self.player.sessions().get(guild_id) {
                    session.detach_pipeline().await;
                }
            }
        }
    }
}
