use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, UserId},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use super::{NoticeKind, Notifier};
use crate::audio::{
    queue::QueueInfo,
    selection::{PendingSelection, SelectionExpiryHook},
    session::VolumeChange,
    track::{QueuedTrack, TrackSource},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Reacciones numéricas de la lista de resultados, en orden
pub const NUMBER_EMOJIS: [&str; 10] = [
    "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟",
];

/// Índice 1-based que representa una reacción numérica
pub fn number_emoji_index(emoji: &str) -> Option<i64> {
    NUMBER_EMOJIS
        .iter()
        .position(|e| *e == emoji)
        .map(|i| i as i64 + 1)
}

fn notice_colour(kind: NoticeKind) -> Colour {
    match kind {
        NoticeKind::Info => colors::INFO_BLUE,
        NoticeKind::Success => colors::SUCCESS_GREEN,
        NoticeKind::Warning => colors::WARNING_ORANGE,
        NoticeKind::Error => colors::ERROR_RED,
    }
}

/// Embed simple para un aviso
pub fn create_notice_embed(kind: NoticeKind, text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text)
        .color(notice_colour(kind))
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &QueuedTrack, paused: bool) -> CreateEmbed {
    let source = &track.source;
    let title = if paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", source.title()))
        .color(colors::MUSIC_PURPLE)
        .field("🎤 Artista", source.author().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration_label(source), true)
        .field("👤 Solicitado por", format!("<@{}>", track.owner.user_id), true);

    if let Some(thumbnail) = source.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(source.uri())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize, prefix: &str) -> CreateEmbed {
    let items_per_page = 10;
    let queue_page = queue_info.get_page(page, items_per_page);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.total_items == 0 && queue_info.current.is_none() {
        return embed
            .description(format!(
                "😴 **La cola está vacía**\n\n💡 Usa `{}play <canción>` para agregar música",
                prefix
            ))
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &queue_info.current {
        embed = embed.field("▶️ Reproduciendo", track_line(&current.source), false);
    }

    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "**{}**. {}\n",
                    queue_page.first_position + i,
                    track_line(&item.source)
                )
            })
            .collect();
        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", queue_info.total_items);
    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Lista numerada de resultados de búsqueda
pub fn create_search_embed(selection: &PendingSelection, prefix: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(search_list(&selection.candidates))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "Responde con el número, reacciona o usa {}pick 1 3 • expira en {}",
            prefix,
            humantime::format_duration(selection.ttl)
        )))
        .timestamp(Timestamp::now())
}

pub fn create_selection_expired_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("⌛ Búsqueda Expirada")
        .description("La selección ya no está disponible, busca de nuevo.")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(change: VolumeChange, max_volume: u16) -> CreateEmbed {
    let status_emoji = match change.new {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**{}%** → **{}%**", change.old, change.new))
        .field("📊 Nivel", volume_bar(change.new, max_volume), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!("Máximo: {}%", max_volume)))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    let p = prefix;
    CreateEmbed::default()
        .title("🎵 Guild Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            format!(
                "• `{p}play <canción|url>` - Reproduce o busca\n\
                • `{p}search <texto>` - Muestra resultados para elegir\n\
                • `{p}pick <n...>` - Elige de la última búsqueda\n\
                • `{p}pause` / `{p}resume` - Pausa o reanuda\n\
                • `{p}skip` - Salta la canción actual\n\
                • `{p}stop` - Detiene y limpia la cola"
            ),
            false,
        )
        .field(
            "📜 Cola",
            format!(
                "• `{p}queue [página]` - Muestra la cola\n\
                • `{p}np` - Canción actual\n\
                • `{p}remove <posición>` - Quita una canción\n\
                • `{p}clear` - Limpia la cola"
            ),
            false,
        )
        .field(
            "🔊 Conexión",
            format!(
                "• `{p}join` - Conecta al canal de voz\n\
                • `{p}leave` - Desconecta del canal\n\
                • `{p}volume [nivel]` - Ajusta el volumen"
            ),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

fn search_list(candidates: &[TrackSource]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let marker = NUMBER_EMOJIS.get(i).copied().unwrap_or("▫️");
            format!("{} {}\n", marker, track_line(track))
        })
        .collect()
}

fn track_line(track: &TrackSource) -> String {
    let mut line = track.title().to_string();
    if let Some(author) = track.author() {
        line.push_str(&format!(" - {}", author));
    }
    line.push_str(&format!(" `[{}]`", duration_label(track)));
    line
}

fn duration_label(track: &TrackSource) -> String {
    match track.duration() {
        _ if track.is_stream() => "🔴 En vivo".to_string(),
        Some(duration) => format_duration(duration),
        None => "?".to_string(),
    }
}

/// Crea una barra visual de volumen
fn volume_bar(volume: u16, max_volume: u16) -> String {
    let segments = 20usize;
    let filled = (usize::from(volume) * segments / usize::from(max_volume.max(1))).min(segments);
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Notificador que publica embeds en Discord.
///
/// Sending happens on a spawned task; failures are only logged.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, channel_id: ChannelId, kind: NoticeKind, text: String) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let message = CreateMessage::new().embed(create_notice_embed(kind, &text));
            if let Err(e) = channel_id.send_message(&*http, message).await {
                warn!("⚠️ No se pudo enviar aviso al canal {}: {:?}", channel_id, e);
            }
        });
    }
}

impl SelectionExpiryHook for DiscordNotifier {
    fn on_expired(&self, guild_id: GuildId, user_id: UserId, selection: PendingSelection) {
        let Some(prompt) = selection.prompt else {
            debug!("Selección de {} en guild {} expiró sin mensaje", user_id, guild_id);
            return;
        };
        let http = self.http.clone();
        tokio::spawn(async move {
            let edit = EditMessage::new()
                .embed(create_selection_expired_embed())
                .components(Vec::new());
            if let Err(e) = prompt
                .channel_id
                .edit_message(&*http, prompt.message_id, edit)
                .await
            {
                warn!("⚠️ No se pudo marcar la búsqueda como expirada: {:?}", e);
            }
            if let Err(e) = prompt
                .channel_id
                .delete_reactions(&*http, prompt.message_id)
                .await
            {
                debug!("No se pudieron quitar las reacciones: {:?}", e);
            }
        });
    }
}
