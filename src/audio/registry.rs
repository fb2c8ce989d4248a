use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::session::GuildPlaybackSession;
use crate::{config::Config, ui::Notifier};

/// Parámetros con los que se crea cada sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub default_volume: u16,
    pub max_volume: u16,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            max_volume: config.max_volume,
        }
    }
}

/// Mapa de servidor a sesión, la única estructura compartida entre servidores.
///
/// Sharded by `DashMap`, so lookups for different guilds do not contend.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildPlaybackSession>>,
    settings: SessionSettings,
    notifier: Arc<dyn Notifier>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
            notifier,
        }
    }

    /// Crea la sesión del servidor; si ya existe la devuelve sin tocarla
    pub fn insert(&self, guild_id: GuildId) -> Arc<GuildPlaybackSession> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(existing) => {
                warn!("⚠️ La sesión de guild {} ya existía", guild_id);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                info!("🏠 Sesión creada para guild {}", guild_id);
                let session = Arc::new(GuildPlaybackSession::new(
                    guild_id,
                    self.settings.default_volume,
                    self.settings.max_volume,
                    self.notifier.clone(),
                ));
                slot.insert(session.clone());
                session
            }
        }
    }

    /// Quita la sesión; no hacer nada si no existe
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildPlaybackSession>> {
        let removed = self.sessions.remove(&guild_id).map(|(_, session)| session);
        if removed.is_some() {
            info!("👋 Sesión eliminada para guild {}", guild_id);
        }
        removed
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlaybackSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Detiene todas las sesiones en paralelo (apagado del proceso)
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        debug!("Cerrando {} sesiones", sessions.len());
        join_all(sessions.iter().map(|s| s.shutdown())).await;
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::NoticeKind;
    use serenity::model::id::ChannelId;

    struct SilentNotifier;

    impl Notifier for SilentNotifier {
        fn notify(&self, _channel_id: ChannelId, _kind: NoticeKind, _text: String) {}
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            SessionSettings {
                default_volume: 50,
                max_volume: 100,
            },
            Arc::new(SilentNotifier),
        )
    }

    #[test]
    fn test_double_insert_keeps_first_session() {
        let registry = registry();
        let first = registry.insert(GuildId::new(7));
        let second = registry.insert(GuildId::new(7));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let registry = registry();
        assert!(registry.remove(GuildId::new(7)).is_none());

        registry.insert(GuildId::new(7));
        assert!(registry.remove(GuildId::new(7)).is_some());
        assert!(registry.get(GuildId::new(7)).is_none());
    }
}
