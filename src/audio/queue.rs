use std::{collections::VecDeque, time::Duration};
use tracing::debug;

use super::track::{QueuedTrack, TrackId};

/// Cola FIFO de un servidor más la pista que suena ahora.
///
/// Never shared directly: it lives inside a session's lock, so every method
/// here assumes exclusive access.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<QueuedTrack>,
    current: Option<QueuedTrack>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una pista al final de la cola y devuelve su posición (1-based)
    pub fn push_back(&mut self, track: QueuedTrack) -> usize {
        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        self.items.len()
    }

    /// Devuelve una pista a la cabeza de la cola
    pub fn push_front(&mut self, track: QueuedTrack) {
        self.items.push_front(track);
    }

    /// Obtiene el siguiente track (FIFO estricto)
    pub fn pop_next(&mut self) -> Option<QueuedTrack> {
        self.items.pop_front()
    }

    /// Limpia la cola sin tocar la pista actual
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    /// Elimina la pista en `position` (1-based)
    pub fn remove(&mut self, position: usize) -> Option<QueuedTrack> {
        let index = position.checked_sub(1)?;
        self.items.remove(index)
    }

    /// Posición (1-based) de una pista todavía en espera
    pub fn position_of(&self, id: TrackId) -> Option<usize> {
        self.items.iter().position(|t| t.id == id).map(|i| i + 1)
    }

    pub fn current(&self) -> Option<&QueuedTrack> {
        self.current.as_ref()
    }

    pub(crate) fn set_current(&mut self, track: QueuedTrack) {
        self.current = Some(track);
    }

    pub(crate) fn take_current(&mut self) -> Option<QueuedTrack> {
        self.current.take()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Obtiene información de la cola
    pub fn get_info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            total_items: self.items.len(),
            total_duration: self.calculate_total_duration(),
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        let queue_duration: Duration = self
            .items
            .iter()
            .filter_map(|item| item.source.duration())
            .sum();

        let current_duration = self
            .current
            .as_ref()
            .and_then(|c| c.source.duration())
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<QueuedTrack>,
    pub items: Vec<QueuedTrack>,
    pub total_items: usize,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.total_items.div_ceil(items_per_page).max(1);
        let safe_page = page.clamp(1, total_pages);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueuedTrack>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::{TrackOwnership, TrackSource};
    use serenity::model::id::{ChannelId, GuildId, UserId};

    fn track(title: &str, secs: u64) -> QueuedTrack {
        let owner = TrackOwnership::new(GuildId::new(1), ChannelId::new(2), UserId::new(3));
        QueuedTrack::new(
            TrackSource::new(title, format!("https://example.com/{title}"))
                .with_duration(Duration::from_secs(secs)),
            owner,
        )
    }

    #[test]
    fn test_pop_is_fifo() {
        let mut queue = MusicQueue::new();
        queue.push_back(track("a", 1));
        queue.push_back(track("b", 1));
        queue.push_back(track("c", 1));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_next())
            .map(|t| t.title().to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_uses_one_based_positions() {
        let mut queue = MusicQueue::new();
        queue.push_back(track("a", 1));
        queue.push_back(track("b", 1));

        assert!(queue.remove(0).is_none());
        assert!(queue.remove(3).is_none());
        assert_eq!(queue.remove(2).map(|t| t.title().to_string()), Some("b".into()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_info_counts_current_in_total_duration() {
        let mut queue = MusicQueue::new();
        queue.set_current(track("now", 100));
        queue.push_back(track("next", 20));

        let info = queue.get_info();
        assert_eq!(info.total_items, 1);
        assert_eq!(info.total_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_page_out_of_range_is_clamped() {
        let mut queue = MusicQueue::new();
        for i in 0..12 {
            queue.push_back(track(&format!("t{i}"), 1));
        }

        let page = queue.get_info().get_page(9, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.first_position, 11);
        assert_eq!(page.items.len(), 2);
    }
}
