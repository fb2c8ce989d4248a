//! # Guild Jukebox
//!
//! A Discord music bot built around a per-guild playback engine: one
//! session per guild serializes enqueues, skips and pipeline callbacks;
//! search results wait as expiring per-user selections; voice presence
//! pauses and resumes playback automatically.
//!
//! - [`audio`] playback core (sessions, selections, voice activity)
//! - [`sources`] track resolution through yt-dlp
//! - [`bot`] serenity event handler, commands and songbird adapter
//! - [`ui`] notices and embeds
//! - [`config`] environment configuration

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;

pub use error::{MusicError, MusicResult};
