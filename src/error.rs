use serenity::model::id::GuildId;
use thiserror::Error;

/// Errores del motor de reproducción
#[derive(Error, Debug)]
pub enum MusicError {
    /// Una pista llegó a la cola de un servidor distinto al de su dueño.
    #[error("La pista '{title}' pertenece al servidor {owner}, no a {session}")]
    InvalidTrack {
        title: String,
        owner: GuildId,
        session: GuildId,
    },

    #[error("No se pudo resolver la búsqueda: {0}")]
    Resolution(String),

    #[error("Error de reproducción: {0}")]
    Playback(String),

    #[error("No tienes ninguna búsqueda pendiente")]
    SelectionNotFound,

    #[error("Configuración inválida: {0}")]
    Configuration(String),

    #[error("No hay sesión de reproducción para el servidor {0}")]
    NoSession(GuildId),

    #[error("No estoy conectado a un canal de voz")]
    NotConnected,
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;
