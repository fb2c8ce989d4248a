//! # Sources Module
//!
//! Track resolution. A [`TrackResolver`] turns a user query (URL or free
//! text) into a [`Resolution`]; the playback core attaches ownership and
//! decides whether it is enqueued or parked as a pending selection.

pub mod youtube;

use async_trait::async_trait;

use crate::audio::track::TrackSource;

pub use youtube::YtDlpResolver;

/// Resultado de resolver una búsqueda o URL
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Una sola pista reproducible
    Track(TrackSource),
    /// Lista de reproducción; `selected` apunta a la pista que el enlace
    /// ya eligió dentro de ella
    Playlist {
        name: String,
        tracks: Vec<TrackSource>,
        selected: Option<usize>,
    },
    /// Candidatos de una búsqueda por texto
    Search(Vec<TrackSource>),
    NoMatches,
    Failed(String),
}

impl Resolution {
    /// Pista elegida dentro de una playlist, si el índice es válido
    pub fn selected_track(&self) -> Option<&TrackSource> {
        match self {
            Resolution::Playlist {
                tracks,
                selected: Some(index),
                ..
            } => tracks.get(*index),
            _ => None,
        }
    }
}

/// Fuente capaz de resolver consultas a pistas.
///
/// Never fails with an error: failures are a [`Resolution::Failed`] so the
/// caller can report them to the requesting channel.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Resolution;
}

/// Si la consulta parece una URL y no texto libre
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
