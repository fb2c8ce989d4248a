mod common;

use common::*;
use guild_jukebox::{
    audio::{
        player::{AudioPlayer, QueryMode, ResolutionOutcome},
        selection::{
            PendingSelection, PendingSelectionRegistry, SelectionExpiryHook, SelectionRejection,
        },
        session::EnqueueOutcome,
        track::{TrackOwnership, TrackSource},
    },
    sources::{Resolution, TrackResolver},
    ui::NoticeKind,
    MusicError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};

const TTL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct RecordingHook {
    expired: Mutex<Vec<(GuildId, UserId, usize)>>,
}

impl SelectionExpiryHook for RecordingHook {
    fn on_expired(&self, guild_id: GuildId, user_id: UserId, selection: PendingSelection) {
        self.expired
            .lock()
            .push((guild_id, user_id, selection.candidates.len()));
    }
}

/// Resolver que siempre devuelve lo mismo
struct FixedResolver(Resolution);

#[async_trait]
impl TrackResolver for FixedResolver {
    async fn resolve(&self, _query: &str) -> Resolution {
        self.0.clone()
    }
}

fn titles(sources: &[TrackSource]) -> Vec<&str> {
    sources.iter().map(|s| s.title()).collect()
}

fn candidates(names: &[&str]) -> Vec<TrackSource> {
    names.iter().map(|n| source(n)).collect()
}

#[tokio::test]
async fn test_partial_selection_consumes_entry() {
    let registry = PendingSelectionRegistry::new(5);
    registry.register(GUILD, USER, candidates(&["x", "y", "z"]), TTL);

    let outcome = registry.resolve(GUILD, USER, &[1, 9, 2]).unwrap();

    assert_eq!(titles(&outcome.selected), ["x", "y"]);
    assert_eq!(outcome.rejected, [SelectionRejection::OutOfBounds(9)]);
    assert!(registry.get(GUILD, USER).is_none());
    assert!(matches!(
        registry.resolve(GUILD, USER, &[1]),
        Err(MusicError::SelectionNotFound)
    ));
}

#[tokio::test]
async fn test_all_invalid_indices_keep_entry() {
    let registry = PendingSelectionRegistry::new(5);
    registry.register(GUILD, USER, candidates(&["x", "y"]), TTL);

    let outcome = registry.resolve(GUILD, USER, &[0, -3, 7]).unwrap();

    assert!(outcome.selected.is_empty());
    assert_eq!(
        outcome.rejected,
        [
            SelectionRejection::InvalidIndex(0),
            SelectionRejection::InvalidIndex(-3),
            SelectionRejection::OutOfBounds(7),
        ]
    );
    assert!(registry.get(GUILD, USER).is_some());
}

#[tokio::test]
async fn test_selections_are_per_user() {
    let registry = PendingSelectionRegistry::new(5);
    let other = UserId::new(101);
    registry.register(GUILD, USER, candidates(&["mine"]), TTL);
    registry.register(GUILD, other, candidates(&["theirs"]), TTL);

    let outcome = registry.resolve(GUILD, other, &[1]).unwrap();

    assert_eq!(titles(&outcome.selected), ["theirs"]);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(GUILD, USER).unwrap().candidates[0].title(), "mine");
}

#[tokio::test(start_paused = true)]
async fn test_expired_selection_calls_hook_once() {
    let hook = Arc::new(RecordingHook::default());
    let registry = PendingSelectionRegistry::new(5).with_expiry_hook(hook.clone());
    registry.register(GUILD, USER, candidates(&["x", "y"]), TTL);

    tokio::time::sleep(TTL + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;

    assert_eq!(*hook.expired.lock(), [(GUILD, USER, 2)]);
    assert!(matches!(
        registry.resolve(GUILD, USER, &[1]),
        Err(MusicError::SelectionNotFound)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_replacement_survives_previous_timer() {
    let hook = Arc::new(RecordingHook::default());
    let registry = PendingSelectionRegistry::new(5).with_expiry_hook(hook.clone());
    registry.register(GUILD, USER, candidates(&["old"]), TTL);

    tokio::time::sleep(Duration::from_secs(20)).await;
    registry.register(GUILD, USER, candidates(&["new-a", "new-b"]), TTL);

    // El primer temporizador habría vencido aquí
    tokio::time::sleep(Duration::from_secs(15)).await;
    tokio::task::yield_now().await;
    assert!(hook.expired.lock().is_empty());
    let pending = registry.get(GUILD, USER).unwrap();
    assert_eq!(titles(&pending.candidates), ["new-a", "new-b"]);

    tokio::time::sleep(Duration::from_secs(20)).await;
    tokio::task::yield_now().await;
    assert_eq!(*hook.expired.lock(), [(GUILD, USER, 2)]);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_selection_before_expiry_cancels_timer() {
    let hook = Arc::new(RecordingHook::default());
    let registry = PendingSelectionRegistry::new(5).with_expiry_hook(hook.clone());
    registry.register(GUILD, USER, candidates(&["x"]), TTL);

    registry.resolve(GUILD, USER, &[1]).unwrap();
    tokio::time::sleep(TTL * 2).await;
    tokio::task::yield_now().await;

    assert!(hook.expired.lock().is_empty());
}

#[tokio::test]
async fn test_clear_guild_only_touches_that_guild() {
    let registry = PendingSelectionRegistry::new(5);
    let other_guild = GuildId::new(2);
    registry.register(GUILD, USER, candidates(&["a"]), TTL);
    registry.register(GUILD, UserId::new(101), candidates(&["b"]), TTL);
    registry.register(other_guild, USER, candidates(&["c"]), TTL);

    assert_eq!(registry.clear_guild(GUILD), 2);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(other_guild, USER).is_some());
}

fn player(notifier: Arc<RecordingNotifier>) -> AudioPlayer {
    let sessions = registry(notifier.clone());
    let player = AudioPlayer::new(
        sessions,
        Arc::new(PendingSelectionRegistry::new(5)),
        notifier,
        TTL,
    );
    player.guild_available(GUILD);
    player
}

async fn connect(player: &AudioPlayer) -> Arc<FakePipeline> {
    let pipeline = FakePipeline::new();
    player
        .session(GUILD)
        .unwrap()
        .attach_pipeline(VOICE, pipeline.clone())
        .await;
    pipeline
}

#[tokio::test]
async fn test_search_then_select_enqueues_choices() {
    let notifier = RecordingNotifier::new();
    let player = player(notifier.clone());
    let pipeline = connect(&player).await;

    let outcome = player
        .handle_resolution(owner(), Resolution::Search(candidates(&["x", "y", "z"])))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ResolutionOutcome::SelectionPending(ref pending) if pending.candidates.len() == 3
    ));
    assert!(pipeline.played().is_empty());

    let result = player.select(owner(), &[3, 9, 1]).await.unwrap();

    assert_eq!(titles(&result.selection.selected), ["z", "x"]);
    assert_eq!(
        result.enqueued,
        [EnqueueOutcome::Started, EnqueueOutcome::Queued { position: 1 }]
    );
    assert_eq!(pipeline.played(), ["z"]);

    let warnings = notifier.texts(NoticeKind::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains('9'));
}

#[tokio::test]
async fn test_select_without_search_is_not_found() {
    let player = player(RecordingNotifier::new());

    let result = player.select(owner(), &[1]).await;

    assert!(matches!(result, Err(MusicError::SelectionNotFound)));
}

#[tokio::test]
async fn test_playlist_with_selected_track_enqueues_only_it() {
    let notifier = RecordingNotifier::new();
    let player = player(notifier);
    let pipeline = connect(&player).await;

    let resolution = Resolution::Playlist {
        name: "mix".to_string(),
        tracks: candidates(&["one", "two", "three"]),
        selected: Some(1),
    };
    let outcome = player.handle_resolution(owner(), resolution).await.unwrap();

    assert!(matches!(
        outcome,
        ResolutionOutcome::Enqueued(EnqueueOutcome::Started)
    ));
    assert_eq!(pipeline.played(), ["two"]);
    assert_eq!(player.session(GUILD).unwrap().queue_info().await.total_items, 0);
}

#[tokio::test]
async fn test_whole_playlist_is_enqueued() {
    let player = player(RecordingNotifier::new());
    let pipeline = connect(&player).await;

    let resolution = Resolution::Playlist {
        name: "mix".to_string(),
        tracks: candidates(&["one", "two", "three"]),
        selected: None,
    };
    let outcome = player.handle_resolution(owner(), resolution).await.unwrap();

    assert!(matches!(outcome, ResolutionOutcome::Playlist(p) if p.added == 3 && p.started));
    assert_eq!(pipeline.played(), ["one"]);
}

#[tokio::test]
async fn test_failed_resolution_warns_requester() {
    let notifier = RecordingNotifier::new();
    let player = player(notifier.clone());

    let no_matches = player.handle_resolution(owner(), Resolution::NoMatches).await;
    let failed = player
        .handle_resolution(owner(), Resolution::Failed("yt-dlp caído".to_string()))
        .await;
    let empty_search = player
        .handle_resolution(owner(), Resolution::Search(Vec::new()))
        .await;

    assert!(matches!(no_matches, Err(MusicError::Resolution(_))));
    assert!(matches!(failed, Err(MusicError::Resolution(_))));
    assert!(matches!(empty_search, Err(MusicError::Resolution(_))));
    assert!(player.selections().is_empty());

    let warnings = notifier.texts(NoticeKind::Warning);
    assert_eq!(warnings.len(), 3);
    assert!(warnings[1].contains("yt-dlp caído"));
    assert!(notifier.notices().iter().all(|n| n.channel_id == TEXT));
}

#[tokio::test]
async fn test_unknown_guild_has_no_session() {
    let player = player(RecordingNotifier::new());
    let stranger = TrackOwnership::new(GuildId::new(77), TEXT, USER);

    let result = player
        .handle_resolution(stranger, Resolution::Track(source("x")))
        .await;

    assert!(matches!(result, Err(MusicError::NoSession(id)) if id == GuildId::new(77)));
}

#[tokio::test]
async fn test_guild_unavailable_drops_session_and_selections() {
    let player = player(RecordingNotifier::new());
    player
        .handle_resolution(owner(), Resolution::Search(candidates(&["x"])))
        .await
        .unwrap();

    player.guild_unavailable(GUILD).await;

    assert!(player.sessions().get(GUILD).is_none());
    assert!(player.selections().is_empty());
}

#[tokio::test]
async fn test_play_query_enqueues_first_search_result() {
    let player = player(RecordingNotifier::new());
    let pipeline = connect(&player).await;
    let resolver = FixedResolver(Resolution::Search(candidates(&["x", "y"])));

    let outcome = player
        .resolve_query(&resolver, owner(), "lofi beats", QueryMode::FirstMatch)
        .await
        .unwrap();

    assert!(matches!(outcome, ResolutionOutcome::Enqueued(EnqueueOutcome::Started)));
    assert_eq!(pipeline.played(), ["x"]);
    assert!(player.selections().is_empty());
}

#[tokio::test]
async fn test_search_query_waits_for_choice() {
    let player = player(RecordingNotifier::new());
    let pipeline = connect(&player).await;
    let resolver = FixedResolver(Resolution::Search(candidates(&["x", "y"])));

    let outcome = player
        .resolve_query(&resolver, owner(), "lofi beats", QueryMode::Choose)
        .await
        .unwrap();

    assert!(matches!(outcome, ResolutionOutcome::SelectionPending(_)));
    assert!(pipeline.played().is_empty());
    assert!(player.selections().get(GUILD, USER).is_some());
}

#[tokio::test]
async fn test_url_search_result_is_never_auto_picked() {
    let player = player(RecordingNotifier::new());
    let resolver = FixedResolver(Resolution::Search(candidates(&["x", "y"])));

    let outcome = player
        .resolve_query(
            &resolver,
            owner(),
            "https://example.com/list",
            QueryMode::FirstMatch,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, ResolutionOutcome::SelectionPending(_)));
}

#[tokio::test]
async fn test_play_query_without_results_warns() {
    let notifier = RecordingNotifier::new();
    let player = player(notifier.clone());
    let resolver = FixedResolver(Resolution::Search(Vec::new()));

    let result = player
        .resolve_query(&resolver, owner(), "nada", QueryMode::FirstMatch)
        .await;

    assert!(matches!(result, Err(MusicError::Resolution(_))));
    assert_eq!(notifier.texts(NoticeKind::Warning).len(), 1);
}
