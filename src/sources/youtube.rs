use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, Resolution, TrackResolver};
use crate::audio::track::TrackSource;

/// Máximo de pistas que se leen de una playlist
pub const MAX_PLAYLIST_ITEMS: usize = 50;

/// Procesos yt-dlp simultáneos
const MAX_CONCURRENT_PROCESSES: usize = 3;

/// Resolver basado en yt-dlp: URLs, playlists y búsquedas de YouTube
pub struct YtDlpResolver {
    search_limit: usize,
    youtube_url: Regex,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Línea de `--dump-json`; en modo `--flat-playlist` casi todo es opcional
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    #[serde(default)]
    id: String,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    is_live: Option<bool>,
    live_status: Option<String>,
    playlist_title: Option<String>,
}

impl YtDlpEntry {
    fn is_live(&self) -> bool {
        self.is_live.unwrap_or(false)
            || matches!(self.live_status.as_deref(), Some("is_live"))
    }

    fn uri(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| {
                (!self.id.is_empty())
                    .then(|| format!("https://www.youtube.com/watch?v={}", self.id))
            })
    }

    fn into_track(self) -> Option<TrackSource> {
        let uri = self.uri()?;
        let is_live = self.is_live();
        let title = self.title.unwrap_or_else(|| uri.clone());

        let mut track = TrackSource::new(title, uri);
        if let Some(author) = self.uploader.or(self.channel) {
            track = track.with_author(author);
        }
        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        if is_live {
            track = track.as_stream();
        }
        Some(track)
    }
}

impl YtDlpResolver {
    pub fn new(search_limit: usize) -> Result<Self> {
        let youtube_url = Regex::new(
            r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|playlist\?|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
        )
        .context("Regex de URLs de YouTube inválida")?;

        Ok(Self {
            search_limit: search_limit.max(1),
            youtube_url,
            rate_limiter: Semaphore::new(MAX_CONCURRENT_PROCESSES),
        })
    }

    /// Verifica si una URL es de YouTube
    pub fn is_youtube_url(&self, url: &str) -> bool {
        self.youtube_url.is_match(url)
    }

    /// Ejecuta yt-dlp y devuelve su salida estándar
    async fn run_ytdlp(&self, args: &[&str]) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .context("Limitador de yt-dlp cerrado")?;

        debug!("yt-dlp {}", args.join(" "));
        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn search(&self, query: &str) -> Result<Resolution> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch{}:{}", self.search_limit, query);
        let stdout = self
            .run_ytdlp(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        let tracks: Vec<TrackSource> = parse_entries(&stdout)
            .into_iter()
            .filter_map(YtDlpEntry::into_track)
            .collect();

        Ok(if tracks.is_empty() {
            Resolution::NoMatches
        } else {
            Resolution::Search(tracks)
        })
    }

    async fn single(&self, url: &str) -> Result<Resolution> {
        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run_ytdlp(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        Ok(parse_entries(&stdout)
            .into_iter()
            .find_map(YtDlpEntry::into_track)
            .map_or(Resolution::NoMatches, Resolution::Track))
    }

    async fn playlist(&self, url: &str, video_id: Option<String>) -> Result<Resolution> {
        info!("📋 Obteniendo playlist: {}", url);
        let max_items = MAX_PLAYLIST_ITEMS.to_string();
        let stdout = self
            .run_ytdlp(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &max_items,
                "--no-warnings",
                url,
            ])
            .await?;

        let entries = parse_entries(&stdout);
        let name = entries
            .iter()
            .find_map(|e| e.playlist_title.clone())
            .unwrap_or_else(|| "Playlist".to_string());
        let selected = video_id.and_then(|id| entries.iter().position(|e| e.id == id));
        let tracks: Vec<TrackSource> = entries
            .into_iter()
            .filter_map(YtDlpEntry::into_track)
            .collect();

        if tracks.is_empty() {
            return Ok(Resolution::NoMatches);
        }
        Ok(Resolution::Playlist {
            name,
            tracks,
            selected,
        })
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Resolution {
        let query = query.trim();
        if query.is_empty() {
            return Resolution::NoMatches;
        }

        let result = if !is_url(query) {
            self.search(query).await
        } else {
            match playlist_params(query) {
                Some((_, video_id)) if self.is_youtube_url(query) => {
                    self.playlist(query, video_id).await
                }
                _ => self.single(query).await,
            }
        };

        result.unwrap_or_else(|e| {
            warn!("⚠️ No se pudo resolver '{}': {:?}", query, e);
            Resolution::Failed(e.to_string())
        })
    }
}

/// Parámetros `list` y `v` de una URL de YouTube
fn playlist_params(url: &str) -> Option<(String, Option<String>)> {
    let parsed = url::Url::parse(url).ok()?;
    let mut list = None;
    let mut video = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "list" => list = Some(value.into_owned()),
            "v" => video = Some(value.into_owned()),
            _ => {}
        }
    }
    list.map(|list| (list, video))
}

/// Una entrada JSON por línea; las líneas que no se entienden se ignoran
fn parse_entries(stdout: &str) -> Vec<YtDlpEntry> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}
