//! Pending search selections.
//!
//! A search that returns several candidates parks them here, keyed by
//! `(guild, user)`, until the user picks by number or the entry expires.
//! Each entry carries a nonce: the expiry timer only removes the exact
//! entry it was started for, so a replaced selection's timer cannot take
//! the new one with it. Selection and expiry both remove through the map's
//! shard lock, so exactly one of them wins a race and the other sees
//! "not found".

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::track::TrackSource;
use crate::error::{MusicError, MusicResult};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const MAX_SEARCH_LIMIT: usize = 10;

type SelectionKey = (GuildId, UserId);

/// Mensaje con la lista de resultados, para actualizarlo al expirar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPrompt {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone)]
pub struct PendingSelection {
    pub candidates: Vec<TrackSource>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub prompt: Option<SelectionPrompt>,
}

/// Por qué no se pudo usar un índice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRejection {
    InvalidIndex(i64),
    OutOfBounds(i64),
}

impl fmt::Display for SelectionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionRejection::InvalidIndex(i) => write!(f, "`{}`: índice inválido", i),
            SelectionRejection::OutOfBounds(i) => write!(f, "`{}`: fuera de rango", i),
        }
    }
}

/// Resultado de una selección: éxitos y rechazos juntos
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub selected: Vec<TrackSource>,
    pub rejected: Vec<SelectionRejection>,
    /// Presente solo si la selección consumió la entrada
    pub prompt: Option<SelectionPrompt>,
}

/// Se llama cuando una selección caduca sin que el usuario elija
pub trait SelectionExpiryHook: Send + Sync {
    fn on_expired(&self, guild_id: GuildId, user_id: UserId, selection: PendingSelection);
}

struct PendingEntry {
    selection: PendingSelection,
    nonce: u64,
    cancel: CancellationToken,
}

pub struct PendingSelectionRegistry {
    entries: Arc<DashMap<SelectionKey, PendingEntry>>,
    search_limit: usize,
    next_nonce: AtomicU64,
    expiry_hook: Option<Arc<dyn SelectionExpiryHook>>,
}

impl PendingSelectionRegistry {
    pub fn new(search_limit: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            search_limit: search_limit.min(MAX_SEARCH_LIMIT),
            next_nonce: AtomicU64::new(1),
            expiry_hook: None,
        }
    }

    pub fn with_expiry_hook(mut self, hook: Arc<dyn SelectionExpiryHook>) -> Self {
        self.expiry_hook = Some(hook);
        self
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Guarda los candidatos del usuario, reemplazando cualquier selección previa.
    ///
    /// Must be called from within a Tokio runtime: it spawns the expiry timer.
    pub fn register(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        mut candidates: Vec<TrackSource>,
        ttl: Duration,
    ) -> PendingSelection {
        candidates.truncate(self.search_limit);
        let key = (guild_id, user_id);
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let selection = PendingSelection {
            candidates,
            created_at: Utc::now(),
            ttl,
            prompt: None,
        };

        let entry = PendingEntry {
            selection: selection.clone(),
            nonce,
            cancel: cancel.clone(),
        };
        if let Some(previous) = self.entries.insert(key, entry) {
            previous.cancel.cancel();
            debug!(
                "Selección previa de {} en guild {} reemplazada",
                user_id, guild_id
            );
        }

        let entries = Arc::clone(&self.entries);
        let hook = self.expiry_hook.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    if let Some(expired) = expire_entry(&entries, key, nonce) {
                        info!("⌛ Selección de {} en guild {} expirada", user_id, guild_id);
                        if let Some(hook) = hook {
                            hook.on_expired(guild_id, user_id, expired);
                        }
                    }
                }
            }
        });

        debug!(
            "🔍 {} candidatos pendientes para {} en guild {} (expira en {})",
            selection.candidates.len(),
            user_id,
            guild_id,
            humantime::format_duration(ttl)
        );
        selection
    }

    /// Resuelve índices 1-based contra la selección pendiente.
    ///
    /// Every index is answered, valid or not. If at least one resolves, the
    /// whole pending selection is consumed; otherwise it stays for a retry.
    pub fn resolve(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        indices: &[i64],
    ) -> MusicResult<SelectionOutcome> {
        let Entry::Occupied(occupied) = self.entries.entry((guild_id, user_id)) else {
            return Err(MusicError::SelectionNotFound);
        };

        let mut outcome = pick(&occupied.get().selection.candidates, indices);
        if !outcome.selected.is_empty() {
            let entry = occupied.remove();
            entry.cancel.cancel();
            outcome.prompt = entry.selection.prompt;
        }
        Ok(outcome)
    }

    pub fn get(&self, guild_id: GuildId, user_id: UserId) -> Option<PendingSelection> {
        self.entries
            .get(&(guild_id, user_id))
            .map(|e| e.selection.clone())
    }

    /// Invalida la selección manualmente
    pub fn remove(&self, guild_id: GuildId, user_id: UserId) -> Option<PendingSelection> {
        let (_, entry) = self.entries.remove(&(guild_id, user_id))?;
        entry.cancel.cancel();
        Some(entry.selection)
    }

    /// Asocia el mensaje con la lista; `false` si la selección ya no existe
    pub fn attach_prompt(&self, guild_id: GuildId, user_id: UserId, prompt: SelectionPrompt) -> bool {
        match self.entries.get_mut(&(guild_id, user_id)) {
            Some(mut entry) => {
                entry.selection.prompt = Some(prompt);
                true
            }
            None => false,
        }
    }

    /// Descarta todas las selecciones de un servidor
    pub fn clear_guild(&self, guild_id: GuildId) -> usize {
        let keys: Vec<SelectionKey> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == guild_id)
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                entry.cancel.cancel();
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Quita la entrada solo si sigue siendo la que inició este temporizador
fn expire_entry(
    entries: &DashMap<SelectionKey, PendingEntry>,
    key: SelectionKey,
    nonce: u64,
) -> Option<PendingSelection> {
    entries
        .remove_if(&key, |_, entry| entry.nonce == nonce)
        .map(|(_, entry)| entry.selection)
}

fn pick(candidates: &[TrackSource], indices: &[i64]) -> SelectionOutcome {
    let mut outcome = SelectionOutcome::default();
    for &index in indices {
        if index < 1 {
            outcome.rejected.push(SelectionRejection::InvalidIndex(index));
            continue;
        }
        match candidates.get((index - 1) as usize) {
            Some(track) => outcome.selected.push(track.clone()),
            None => outcome.rejected.push(SelectionRejection::OutOfBounds(index)),
        }
    }
    outcome
}
