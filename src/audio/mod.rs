//! # Audio Module
//!
//! Per-guild playback orchestration for Guild Jukebox.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Playback Session
//! - Owns the FIFO queue, the now-playing slot, pause flag and volume
//! - One async mutex per guild; at most one active track at a time
//! - Notices are dispatched after the lock is released
//!
//! ### [`registry`] - Session Registry
//! - Sharded `GuildId -> session` map, the only cross-guild structure
//! - Idempotent insert/remove on guild join/leave
//!
//! ### [`selection`] - Pending Selections
//! - Search candidates per `(guild, user)` with a TTL
//! - Selection and expiry race safely: exactly one wins
//!
//! ### [`voice_activity`] - Voice Activity
//! - Pauses when the bot's channel has no listeners, resumes when they return
//!
//! ### [`events`] - Playback Event Sink
//! - Turns pipeline callbacks (start, end, exception, stuck) into session
//!   transitions and notices
//!
//! ### [`player`] - Audio Player
//! - Entry point for the command layer: routes resolver results
//!
//! The audio transport itself sits behind [`pipeline::AudioPipeline`].

pub mod events;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod registry;
pub mod selection;
pub mod session;
pub mod track;
pub mod voice_activity;
