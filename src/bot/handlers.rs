use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::{Message, ReactionType},
        id::{ChannelId, GuildId, RoleId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    permissions::{CommandAuthor, MusicAction, PermissionGate},
    voice::SongbirdPipeline,
    JukeboxBot,
};
use crate::{
    audio::{
        events::PlaybackEventSink,
        player::{QueryMode, ResolutionOutcome},
        selection::SelectionPrompt,
        track::TrackOwnership,
    },
    error::MusicError,
    ui::{
        embeds::{self, NUMBER_EMOJIS},
        NoticeKind,
    },
};

/// Separa `<prefijo><comando> <argumentos>`
pub fn parse_command<'a>(content: &'a str, prefix: &str) -> Option<(String, &'a str)> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().filter(|c| !c.is_empty())?;
    let args = parts.next().unwrap_or("").trim();
    Some((command.to_lowercase(), args))
}

/// Lee índices como `1 3`, `2,4` o `5`; `None` si algo no es un número
pub fn parse_indices(text: &str) -> Option<Vec<i64>> {
    let indices: Vec<i64> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.parse().ok())
        .collect::<Option<_>>()?;
    (!indices.is_empty()).then_some(indices)
}

/// Maneja mensajes del servidor: comandos con prefijo y respuestas numéricas
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let Some((command, args)) = parse_command(&msg.content, &bot.config.command_prefix) else {
        return handle_bare_selection(ctx, msg, guild_id, bot).await;
    };

    let Some(action) = command_action(&command) else {
        debug!("Comando desconocido '{}' en guild {}", command, guild_id);
        return Ok(());
    };

    info!(
        "📝 Comando {}{} usado por {} en guild {}",
        bot.config.command_prefix, command, msg.author.name, guild_id
    );

    let author = command_author(ctx, msg, guild_id);
    if !bot.permissions.has_permission(&author, action) {
        return reply(
            ctx,
            msg.channel_id,
            NoticeKind::Error,
            "🚫 Necesitas el rol DJ para usar este comando",
        )
        .await;
    }

    match command.as_str() {
        "play" | "p" => handle_play(ctx, msg, guild_id, args, QueryMode::FirstMatch, bot).await,
        "search" => handle_play(ctx, msg, guild_id, args, QueryMode::Choose, bot).await,
        "pick" | "select" => handle_pick(ctx, msg, guild_id, args, bot).await,
        "skip" | "s" => handle_skip(ctx, msg, guild_id, bot).await,
        "clear" => handle_clear(ctx, msg, guild_id, bot).await,
        "remove" => handle_remove(ctx, msg, guild_id, args, bot).await,
        "pause" => handle_pause(ctx, msg, guild_id, bot).await,
        "resume" => handle_resume(ctx, msg, guild_id, bot).await,
        "volume" | "vol" => handle_volume(ctx, msg, guild_id, args, bot).await,
        "queue" | "q" => handle_queue(ctx, msg, guild_id, args, bot).await,
        "np" | "nowplaying" => handle_nowplaying(ctx, msg, guild_id, bot).await,
        "stop" => handle_stop(ctx, msg, guild_id, bot).await,
        "join" => handle_join(ctx, msg, guild_id, bot).await,
        "leave" => handle_leave(ctx, msg, guild_id, bot).await,
        "help" => send_embed(ctx, msg.channel_id, embeds::create_help_embed(&bot.config.command_prefix)).await,
        _ => Ok(()),
    }
}

fn command_action(command: &str) -> Option<MusicAction> {
    let action = match command {
        "play" | "p" => MusicAction::Play,
        "search" => MusicAction::Search,
        "pick" | "select" => MusicAction::Select,
        "skip" | "s" => MusicAction::Skip,
        "clear" => MusicAction::Clear,
        "remove" => MusicAction::Remove,
        "pause" => MusicAction::Pause,
        "resume" => MusicAction::Resume,
        "volume" | "vol" => MusicAction::Volume,
        "queue" | "q" | "np" | "nowplaying" | "help" => MusicAction::View,
        "stop" => MusicAction::Stop,
        "join" => MusicAction::Join,
        "leave" => MusicAction::Leave,
        _ => return None,
    };
    Some(action)
}

fn command_author(ctx: &Context, msg: &Message, guild_id: GuildId) -> CommandAuthor {
    let roles = msg
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .unwrap_or_default();
    member_author(ctx, guild_id, msg.author.id, roles)
}

/// Autor con sus roles; admin si es dueño del servidor o tiene el permiso
pub(crate) fn member_author(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    roles: Vec<RoleId>,
) -> CommandAuthor {
    let is_admin = ctx.cache.guild(guild_id).is_some_and(|guild| {
        guild.owner_id == user_id
            || guild
                .members
                .get(&user_id)
                .is_some_and(|member| guild.member_permissions(member).administrator())
    });

    CommandAuthor {
        user_id,
        roles,
        is_admin,
    }
}

/// Un número suelto o una reacción solo eligen si hay una búsqueda pendiente
/// y el autor puede seleccionar.
pub(crate) fn accepts_selection(
    gate: &dyn PermissionGate,
    author: &CommandAuthor,
    pending: bool,
) -> bool {
    if !pending {
        return false;
    }
    let allowed = gate.has_permission(author, MusicAction::Select);
    if !allowed {
        debug!("Selección de {} rechazada por permisos", author.user_id);
    }
    allowed
}

fn owner(msg: &Message, guild_id: GuildId) -> TrackOwnership {
    TrackOwnership::new(guild_id, msg.channel_id, msg.author.id)
}

/// Canal de voz en el que está el usuario, según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)?
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
}

/// Conecta el bot al canal de voz del usuario y engancha el pipeline a la sesión
pub async fn join_author_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    bot: &JukeboxBot,
) -> Result<ChannelId> {
    let channel_id = user_voice_channel(ctx, guild_id, user_id).ok_or(MusicError::NotConnected)?;
    let session = bot.player.session(guild_id)?;
    if session.voice_channel().await == Some(channel_id) {
        return Ok(channel_id);
    }

    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
    let call = manager.join(guild_id, channel_id).await?;

    // Songbird mueve la misma llamada: el pipeline actual sigue sirviendo
    if session.set_voice_channel(channel_id).await {
        info!("🔀 Movido al canal de voz {} en guild {}", channel_id, guild_id);
        return Ok(channel_id);
    }

    let pipeline = SongbirdPipeline::new(
        guild_id,
        call,
        bot.http_client.clone(),
        PlaybackEventSink::new(&session),
    );
    session.attach_pipeline(channel_id, Arc::new(pipeline)).await;
    info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
    Ok(channel_id)
}

async fn ensure_voice(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<bool> {
    if bot.player.session(guild_id)?.voice_channel().await.is_some() {
        return Ok(true);
    }
    match join_author_channel(ctx, guild_id, msg.author.id, bot).await {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.downcast_ref::<MusicError>(), Some(MusicError::NotConnected)) => {
            reply(
                ctx,
                msg.channel_id,
                NoticeKind::Warning,
                "🔇 Debes estar en un canal de voz",
            )
            .await?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// `play` encola el primer resultado de una búsqueda; `search` deja elegir
async fn handle_play(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    query: &str,
    mode: QueryMode,
    bot: &JukeboxBot,
) -> Result<()> {
    if query.is_empty() {
        let usage = format!("💡 Uso: `{}play <canción|url>`", bot.config.command_prefix);
        return reply(ctx, msg.channel_id, NoticeKind::Info, &usage).await;
    }
    if !ensure_voice(ctx, msg, guild_id, bot).await? {
        return Ok(());
    }

    let typing = msg.channel_id.start_typing(&ctx.http);
    let outcome = bot
        .player
        .resolve_query(bot.resolver.as_ref(), owner(msg, guild_id), query, mode)
        .await;
    typing.stop();

    match outcome {
        Ok(ResolutionOutcome::SelectionPending(pending)) => {
            let prompt = msg
                .channel_id
                .send_message(
                    &ctx.http,
                    CreateMessage::new()
                        .embed(embeds::create_search_embed(&pending, &bot.config.command_prefix)),
                )
                .await?;

            bot.player.selections().attach_prompt(
                guild_id,
                msg.author.id,
                SelectionPrompt {
                    channel_id: prompt.channel_id,
                    message_id: prompt.id,
                },
            );
            for emoji in NUMBER_EMOJIS.iter().take(pending.candidates.len()) {
                if let Err(e) = prompt
                    .react(&ctx.http, ReactionType::Unicode(emoji.to_string()))
                    .await
                {
                    debug!("No se pudo agregar reacción: {:?}", e);
                    break;
                }
            }
            Ok(())
        }
        // Los avisos de encolado y de error ya los envía el motor
        Ok(_) | Err(MusicError::Resolution(_)) => Ok(()),
        Err(e) => reply(ctx, msg.channel_id, NoticeKind::Error, &format!("❌ {}", e)).await,
    }
}

async fn handle_pick(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    args: &str,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(indices) = parse_indices(args) else {
        let usage = format!("💡 Uso: `{}pick 1 3`", bot.config.command_prefix);
        return reply(ctx, msg.channel_id, NoticeKind::Info, &usage).await;
    };
    apply_selection(ctx, owner(msg, guild_id), msg.author.id, &indices, bot).await
}

/// Un número suelto cuenta como selección solo si el usuario tiene una pendiente
async fn handle_bare_selection(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(indices) = parse_indices(&msg.content) else {
        return Ok(());
    };
    let pending = bot.player.selections().get(guild_id, msg.author.id).is_some();
    let author = command_author(ctx, msg, guild_id);
    if !accepts_selection(bot.permissions.as_ref(), &author, pending) {
        return Ok(());
    }
    apply_selection(ctx, owner(msg, guild_id), msg.author.id, &indices, bot).await
}

/// Selección por reacción numérica sobre la lista de resultados
pub async fn handle_reaction_selection(
    ctx: &Context,
    owner: TrackOwnership,
    index: i64,
    bot: &JukeboxBot,
) -> Result<()> {
    apply_selection(ctx, owner, owner.user_id, &[index], bot).await
}

async fn apply_selection(
    ctx: &Context,
    owner: TrackOwnership,
    user_id: UserId,
    indices: &[i64],
    bot: &JukeboxBot,
) -> Result<()> {
    if bot.player.session(owner.guild_id)?.voice_channel().await.is_none() {
        if let Err(e) = join_author_channel(ctx, owner.guild_id, user_id, bot).await {
            debug!("Selección sin canal de voz en guild {}: {:?}", owner.guild_id, e);
        }
    }

    match bot.player.select(owner, indices).await {
        Ok(result) => {
            if let Some(prompt) = result.selection.prompt {
                if let Err(e) = prompt.channel_id.delete_message(&ctx.http, prompt.message_id).await {
                    debug!("No se pudo borrar la lista de resultados: {:?}", e);
                }
            }
            Ok(())
        }
        Err(MusicError::SelectionNotFound) => {
            reply(
                ctx,
                owner.channel_id,
                NoticeKind::Warning,
                "⌛ No tienes ninguna búsqueda pendiente",
            )
            .await
        }
        Err(e) => reply(ctx, owner.channel_id, NoticeKind::Error, &format!("❌ {}", e)).await,
    }
}

async fn handle_skip(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let session = bot.player.session(guild_id)?;
    match session.skip_current().await {
        Some(track) => {
            let text = format!("⏭️ Saltada: **{}**", track.title());
            reply(ctx, msg.channel_id, NoticeKind::Success, &text).await
        }
        None => reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ No hay nada sonando").await,
    }
}

async fn handle_clear(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let removed = bot.player.session(guild_id)?.clear_queue().await;
    if removed == 0 {
        return reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ La cola ya estaba vacía").await;
    }
    let text = format!("🗑️ {} canciones eliminadas de la cola", removed);
    reply(ctx, msg.channel_id, NoticeKind::Success, &text).await
}

async fn handle_remove(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    args: &str,
    bot: &JukeboxBot,
) -> Result<()> {
    let Ok(position) = args.parse::<usize>() else {
        let usage = format!("💡 Uso: `{}remove <posición>`", bot.config.command_prefix);
        return reply(ctx, msg.channel_id, NoticeKind::Info, &usage).await;
    };
    match bot.player.session(guild_id)?.remove(position).await {
        Some(track) => {
            let text = format!("🗑️ Eliminada: **{}**", track.title());
            reply(ctx, msg.channel_id, NoticeKind::Success, &text).await
        }
        None => {
            let text = format!("⚠️ No hay ninguna canción en la posición {}", position);
            reply(ctx, msg.channel_id, NoticeKind::Warning, &text).await
        }
    }
}

async fn handle_pause(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    if bot.player.session(guild_id)?.pause().await {
        reply(ctx, msg.channel_id, NoticeKind::Success, "⏸️ Reproducción pausada").await
    } else {
        reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ Ya estaba en pausa").await
    }
}

async fn handle_resume(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    if bot.player.session(guild_id)?.resume().await {
        reply(ctx, msg.channel_id, NoticeKind::Success, "▶️ Reproducción reanudada").await
    } else {
        reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ La reproducción no estaba en pausa").await
    }
}

async fn handle_volume(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    args: &str,
    bot: &JukeboxBot,
) -> Result<()> {
    let session = bot.player.session(guild_id)?;
    if args.is_empty() {
        let text = format!(
            "🔊 Volumen actual: **{}%** (máx {}%)",
            session.volume().await,
            session.max_volume()
        );
        return reply(ctx, msg.channel_id, NoticeKind::Info, &text).await;
    }
    let Ok(requested) = args.parse::<i64>() else {
        let usage = format!("💡 Uso: `{}volume <0-{}>`", bot.config.command_prefix, session.max_volume());
        return reply(ctx, msg.channel_id, NoticeKind::Info, &usage).await;
    };

    let change = session.set_volume(requested).await;
    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_volume_embed(change, session.max_volume()),
    )
    .await
}

async fn handle_queue(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    args: &str,
    bot: &JukeboxBot,
) -> Result<()> {
    let page = args.parse::<usize>().unwrap_or(1);
    let info = bot.player.session(guild_id)?.queue_info().await;
    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_queue_embed(&info, page, &bot.config.command_prefix),
    )
    .await
}

async fn handle_nowplaying(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let session = bot.player.session(guild_id)?;
    match session.now_playing().await {
        Some(track) => {
            let paused = session.is_paused().await;
            send_embed(ctx, msg.channel_id, embeds::create_now_playing_embed(&track, paused)).await
        }
        None => reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ No hay nada sonando").await,
    }
}

async fn handle_stop(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let summary = bot.player.session(guild_id)?.stop().await;
    let text = match summary.stopped {
        Some(track) => format!(
            "⏹️ Detenida **{}** y {} canciones eliminadas de la cola",
            track.title(),
            summary.cleared
        ),
        None => format!("⏹️ Cola limpiada ({} canciones)", summary.cleared),
    };
    reply(ctx, msg.channel_id, NoticeKind::Success, &text).await
}

async fn handle_join(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    match join_author_channel(ctx, guild_id, msg.author.id, bot).await {
        Ok(channel_id) => {
            let text = format!("🔊 Conectado a <#{}>", channel_id);
            reply(ctx, msg.channel_id, NoticeKind::Success, &text).await
        }
        Err(e) if matches!(e.downcast_ref::<MusicError>(), Some(MusicError::NotConnected)) => {
            reply(ctx, msg.channel_id, NoticeKind::Warning, "🔇 Debes estar en un canal de voz").await
        }
        Err(e) => {
            error!("Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
            reply(ctx, msg.channel_id, NoticeKind::Error, "❌ Error al conectar al canal de voz").await
        }
    }
}

async fn handle_leave(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    bot.player.session(guild_id)?.detach_pipeline().await;
    if manager.get(guild_id).is_none() {
        return reply(ctx, msg.channel_id, NoticeKind::Info, "ℹ️ No estoy en ningún canal de voz").await;
    }
    if let Err(e) = manager.remove(guild_id).await {
        warn!("Error al salir del canal de voz en guild {}: {:?}", guild_id, e);
    }

    info!("👋 Desconectado del canal de voz en guild {}", guild_id);
    reply(ctx, msg.channel_id, NoticeKind::Success, "👋 Desconectado del canal de voz").await
}

async fn reply(ctx: &Context, channel_id: ChannelId, kind: NoticeKind, text: &str) -> Result<()> {
    send_embed(ctx, channel_id, embeds::create_notice_embed(kind, text)).await
}

async fn send_embed(ctx: &Context, channel_id: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::permissions::MockPermissionGate;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("!play  never gonna", "!"),
            Some(("play".to_string(), "never gonna"))
        );
        assert_eq!(parse_command("!SKIP", "!"), Some(("skip".to_string(), "")));
        assert_eq!(parse_command("play", "!"), None);
        assert_eq!(parse_command("!", "!"), None);
    }

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_indices("1 9 2"), Some(vec![1, 9, 2]));
        assert_eq!(parse_indices("1,3, 3"), Some(vec![1, 3, 3]));
        assert_eq!(parse_indices("-1"), Some(vec![-1]));
        assert_eq!(parse_indices("1 two"), None);
        assert_eq!(parse_indices("   "), None);
    }

    fn author() -> CommandAuthor {
        CommandAuthor {
            user_id: UserId::new(100),
            roles: Vec::new(),
            is_admin: false,
        }
    }

    #[test]
    fn test_selection_without_pending_skips_gate() {
        let mut gate = MockPermissionGate::new();
        gate.expect_has_permission().times(0);

        assert!(!accepts_selection(&gate, &author(), false));
    }

    #[test]
    fn test_selection_is_gated_on_select_action() {
        let mut gate = MockPermissionGate::new();
        gate
            .expect_has_permission()
            .withf(|author, action| {
                author.user_id == UserId::new(100) && *action == MusicAction::Select
            })
            .times(1)
            .returning(|_, _| true);
        assert!(accepts_selection(&gate, &author(), true));

        let mut denying = MockPermissionGate::new();
        denying
            .expect_has_permission()
            .times(1)
            .returning(|_, _| false);
        assert!(!accepts_selection(&denying, &author(), true));
    }

    #[test]
    fn test_every_command_maps_to_an_action() {
        for command in ["play", "search", "pick", "skip", "clear", "remove", "pause", "resume", "volume", "queue", "np", "stop", "join", "leave", "help"] {
            assert!(command_action(command).is_some(), "{command}");
        }
        assert!(command_action("dance").is_none());
    }
}
