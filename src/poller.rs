//! Poll scheduling and state-change detection.
//!
//! One long-lived task sweeps every tracked player on a fixed interval,
//! compares each player's current state string against the stored one, and
//! fans out a notification to every subscribed guild on a change. Failures
//! are contained: one player's upstream error or one guild's delivery
//! failure never aborts the rest of the pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::game::Tracker;
use crate::registry::Registry;
use crate::sink::MessagingSink;
use crate::storage::{Repository, TrackedPlayer};

pub struct Poller {
    repo: Arc<dyn Repository>,
    registry: Arc<Registry>,
    sink: Arc<dyn MessagingSink>,
    interval: Duration,
}

/// Handle to a spawned poller. `stop` consumes the handle, so it can only be
/// called once.
pub struct PollerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the poller to stop and wait for any in-flight pass to finish.
    /// Safe to call before the first tick fires.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

impl Poller {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<Registry>,
        sink: Arc<dyn MessagingSink>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            registry,
            sink,
            interval,
        }
    }

    /// Spawn the polling loop as a background task.
    ///
    /// The loop stops when `cancellation` fires or when the returned handle's
    /// `stop` is awaited.
    pub fn spawn(self: Arc<Self>, cancellation: CancellationToken) -> PollerHandle {
        let stop = cancellation.child_token();
        let token = stop.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        PollerHandle { stop, task }
    }

    /// Run the polling loop until cancelled.
    ///
    /// Executes one pass immediately, then one per interval tick. A pass in
    /// progress always completes before this returns; cancellation is only
    /// observed between ticks.
    pub async fn run(&self, cancellation: CancellationToken) {
        if cancellation.is_cancelled() {
            log::info!("poller stopped before first pass");
            return;
        }

        log::info!("poller started, interval {:?}", self.interval);
        self.poll_pass().await;

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; the pass above covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    log::info!("poller stopped");
                    return;
                }
                _ = ticker.tick() => self.poll_pass().await,
            }
        }
    }

    /// One sweep over every tracked player. An empty set is a normal no-op.
    pub async fn poll_pass(&self) {
        let players = match self.repo.list_tracked_players().await {
            Ok(players) => players,
            Err(e) => {
                log::error!("failed to list tracked players: {e}");
                return;
            }
        };
        if players.is_empty() {
            log::debug!("no players to poll");
            return;
        }

        log::debug!("polling {} players", players.len());
        for player in &players {
            self.check_player(player).await;
        }
    }

    async fn check_player(&self, player: &TrackedPlayer) {
        let tracker = match self.registry.get(&player.game) {
            Ok(tracker) => tracker,
            Err(e) => {
                log::warn!("skipping {}: {e}", player.display_name);
                return;
            }
        };

        let state = match tracker.current_state(&player.external_id).await {
            Ok(state) => state,
            Err(e) => {
                log::error!("failed to fetch state for {}: {e}", player.display_name);
                return;
            }
        };

        // Nothing observable yet (e.g. an account with no match history).
        if state.is_empty() {
            return;
        }
        if state == player.last_state {
            log::debug!("no change for {}", player.display_name);
            return;
        }

        if player.last_state.is_empty() {
            // First observation: store the baseline without notifying, so a
            // fresh registration does not replay pre-registration history.
            log::info!("baseline for {}: {state}", player.display_name);
            if let Err(e) = self.repo.update_last_state(player.id, &state).await {
                log::error!("failed to store baseline for {}: {e}", player.display_name);
            }
            return;
        }

        log::info!(
            "state change for {}: {} -> {state}",
            player.display_name,
            player.last_state
        );
        if !self.notify(player, tracker.as_ref(), &state).await {
            // Could not even build the content; leave the stored state alone
            // so the transition is retried next pass.
            return;
        }

        // Persist after notify: a persist failure here means at worst one
        // duplicate notification next pass, never a silently dropped one.
        if let Err(e) = self.repo.update_last_state(player.id, &state).await {
            log::error!(
                "failed to persist state for {}, may re-notify next pass: {e}",
                player.display_name
            );
        }
    }

    /// Fan one change out to all subscribed guilds. Returns `false` only when
    /// the notification content could not be produced at all.
    async fn notify(&self, player: &TrackedPlayer, tracker: &dyn Tracker, state: &str) -> bool {
        let subscriptions = match self.repo.subscriptions_for_player(player.id).await {
            Ok(subs) => subs,
            Err(e) => {
                log::error!("failed to load subscriptions for {}: {e}", player.display_name);
                return false;
            }
        };
        if subscriptions.is_empty() {
            return true;
        }

        let notification = match tracker
            .build_notification(&player.external_id, &player.display_name, state)
            .await
        {
            Ok(notification) => notification,
            Err(e) => {
                log::error!(
                    "failed to build notification for {}: {e}",
                    player.display_name
                );
                return false;
            }
        };

        for sub in &subscriptions {
            let settings = match self.repo.guild_settings(&sub.guild_id).await {
                Ok(Some(settings)) => settings,
                Ok(None) => {
                    log::warn!("no notification channel set for guild {}", sub.guild_id);
                    continue;
                }
                Err(e) => {
                    log::error!("failed to load settings for guild {}: {e}", sub.guild_id);
                    continue;
                }
            };

            match self
                .sink
                .send_notification(&settings.channel_id, &notification)
                .await
            {
                Ok(()) => log::info!(
                    "sent notification for {} to guild {}",
                    player.display_name,
                    sub.guild_id
                ),
                Err(e) => log::error!(
                    "failed to send notification to guild {}: {e}",
                    sub.guild_id
                ),
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::game::{GameType, Notification, PlayerInfo, TrackerError};
    use crate::sink::SinkError;
    use crate::storage::{GuildSettings, NewPlayer, StoreError, Subscription};

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct FakeRepo {
        players: Mutex<Vec<TrackedPlayer>>,
        subscriptions: Mutex<Vec<Subscription>>,
        channels: Mutex<HashMap<String, String>>,
        updates: Mutex<Vec<(i64, String)>>,
    }

    impl FakeRepo {
        fn add_player(&self, id: i64, external_id: &str, game: &str, last_state: &str) {
            self.players.lock().unwrap().push(TrackedPlayer {
                id,
                external_id: external_id.to_string(),
                display_name: format!("{external_id}-name"),
                game: game.to_string(),
                last_state: last_state.to_string(),
                created_at: String::new(),
                updated_at: String::new(),
            });
        }

        fn subscribe(&self, player_id: i64, guild_id: &str) {
            let mut subs = self.subscriptions.lock().unwrap();
            let id = subs.len() as i64 + 1;
            subs.push(Subscription {
                id,
                player_id,
                guild_id: guild_id.to_string(),
                registered_by: "tester".to_string(),
                created_at: String::new(),
            });
        }

        fn set_channel(&self, guild_id: &str, channel_id: &str) {
            self.channels
                .lock()
                .unwrap()
                .insert(guild_id.to_string(), channel_id.to_string());
        }

        fn updates(&self) -> Vec<(i64, String)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Repository for FakeRepo {
        async fn list_tracked_players(&self) -> Result<Vec<TrackedPlayer>, StoreError> {
            Ok(self.players.lock().unwrap().clone())
        }

        async fn update_last_state(&self, player_id: i64, state: &str) -> Result<(), StoreError> {
            self.updates
                .lock()
                .unwrap()
                .push((player_id, state.to_string()));
            if let Some(p) = self
                .players
                .lock()
                .unwrap()
                .iter_mut()
                .find(|p| p.id == player_id)
            {
                p.last_state = state.to_string();
            }
            Ok(())
        }

        async fn subscriptions_for_player(
            &self,
            player_id: i64,
        ) -> Result<Vec<Subscription>, StoreError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.player_id == player_id)
                .cloned()
                .collect())
        }

        async fn guild_settings(
            &self,
            guild_id: &str,
        ) -> Result<Option<GuildSettings>, StoreError> {
            Ok(self.channels.lock().unwrap().get(guild_id).map(|c| {
                GuildSettings {
                    guild_id: guild_id.to_string(),
                    channel_id: c.clone(),
                    created_at: String::new(),
                }
            }))
        }

        async fn find_player(
            &self,
            _external_id: &str,
            _game: &str,
        ) -> Result<Option<TrackedPlayer>, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn find_player_by_name(
            &self,
            _display_name: &str,
            _game: &str,
        ) -> Result<Option<TrackedPlayer>, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn create_player(&self, _new: NewPlayer) -> Result<TrackedPlayer, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn add_subscription(
            &self,
            _player_id: i64,
            _guild_id: &str,
            _registered_by: &str,
        ) -> Result<bool, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn remove_subscription(
            &self,
            _player_id: i64,
            _guild_id: &str,
        ) -> Result<bool, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn players_in_guild(
            &self,
            _guild_id: &str,
        ) -> Result<Vec<TrackedPlayer>, StoreError> {
            unimplemented!("not used by the poller")
        }

        async fn upsert_guild_settings(
            &self,
            _guild_id: &str,
            _channel_id: &str,
        ) -> Result<(), StoreError> {
            unimplemented!("not used by the poller")
        }
    }

    #[derive(Default)]
    struct FakeTracker {
        states: Mutex<HashMap<String, String>>,
        failing: Mutex<HashSet<String>>,
        fail_build: bool,
        builds: Mutex<Vec<String>>,
    }

    impl FakeTracker {
        fn set_state(&self, external_id: &str, state: &str) {
            self.states
                .lock()
                .unwrap()
                .insert(external_id.to_string(), state.to_string());
        }

        fn fail_state(&self, external_id: &str) {
            self.failing.lock().unwrap().insert(external_id.to_string());
        }
    }

    #[async_trait]
    impl Tracker for FakeTracker {
        fn name(&self) -> &str {
            "Fake Game"
        }

        fn game_type(&self) -> GameType {
            GameType::Lol
        }

        fn description(&self) -> &str {
            "fake"
        }

        fn validate_player_id(&self, _input: &str) -> Result<(), TrackerError> {
            Ok(())
        }

        async fn resolve_player(&self, _input: &str) -> Result<PlayerInfo, TrackerError> {
            unimplemented!("not used by the poller")
        }

        async fn current_state(&self, external_id: &str) -> Result<String, TrackerError> {
            if self.failing.lock().unwrap().contains(external_id) {
                return Err(TrackerError::Upstream(crate::api::ApiError::Throttled));
            }
            Ok(self
                .states
                .lock()
                .unwrap()
                .get(external_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn build_notification(
            &self,
            external_id: &str,
            display_name: &str,
            state: &str,
        ) -> Result<Notification, TrackerError> {
            if self.fail_build {
                return Err(TrackerError::Upstream(crate::api::ApiError::Throttled));
            }
            self.builds.lock().unwrap().push(external_id.to_string());
            Ok(Notification {
                title: format!("change:{state}"),
                description: String::new(),
                color: 0,
                author_name: display_name.to_string(),
                fields: Vec::new(),
                footer: String::new(),
                timestamp: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail_channels: HashSet<String>,
    }

    impl RecordingSink {
        fn failing(channels: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_channels: channels.iter().map(|c| c.to_string()).collect(),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingSink for RecordingSink {
        async fn send_notification(
            &self,
            channel_id: &str,
            notification: &Notification,
        ) -> Result<(), SinkError> {
            if self.fail_channels.contains(channel_id) {
                return Err(SinkError::Delivery(crate::api::ApiError::Throttled));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), notification.title.clone()));
            Ok(())
        }
    }

    struct Fixture {
        repo: Arc<FakeRepo>,
        tracker: Arc<FakeTracker>,
        sink: Arc<RecordingSink>,
        poller: Poller,
    }

    fn fixture_with_sink(sink: RecordingSink) -> Fixture {
        let repo = Arc::new(FakeRepo::default());
        let tracker = Arc::new(FakeTracker::default());
        let sink = Arc::new(sink);
        let registry = Arc::new(Registry::new());
        registry.register(tracker.clone());
        let poller = Poller::new(
            repo.clone(),
            registry,
            sink.clone(),
            Duration::from_secs(90),
        );
        Fixture {
            repo,
            tracker,
            sink,
            poller,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_sink(RecordingSink::default())
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_unchanged_state_sends_and_stores_nothing() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p1", "M1");

        f.poller.poll_pass().await;
        f.poller.poll_pass().await;

        assert!(f.sink.sent().is_empty());
        assert!(f.repo.updates().is_empty());
    }

    #[tokio::test]
    async fn test_first_observation_stores_baseline_without_notifying() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "");
        f.repo.subscribe(1, "g1");
        f.repo.subscribe(1, "g2");
        f.repo.set_channel("g1", "c1");
        f.repo.set_channel("g2", "c2");
        f.tracker.set_state("p1", "lv:10:exp:500");

        f.poller.poll_pass().await;

        assert!(f.sink.sent().is_empty());
        assert_eq!(f.repo.updates(), vec![(1, "lv:10:exp:500".to_string())]);
    }

    #[tokio::test]
    async fn test_change_fans_out_to_configured_guilds_only() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.subscribe(1, "g2"); // g2 has no channel configured
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p1", "M2");

        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent(), vec![("c1".to_string(), "change:M2".to_string())]);
        assert_eq!(f.repo.updates(), vec![(1, "M2".to_string())]);
    }

    #[tokio::test]
    async fn test_change_is_notified_once_across_passes() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p1", "M2");

        f.poller.poll_pass().await;
        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent().len(), 1);
        assert_eq!(f.repo.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_state_is_skipped_silently() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "");
        f.repo.subscribe(1, "g1");
        f.repo.set_channel("g1", "c1");
        // No state configured in the tracker: current_state returns "".

        f.poller.poll_pass().await;

        assert!(f.sink.sent().is_empty());
        assert!(f.repo.updates().is_empty());
    }

    // -----------------------------------------------------------------------
    // Isolation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_one_players_upstream_error_does_not_abort_the_pass() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.add_player(2, "p2", "lol", "M5");
        f.repo.subscribe(2, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.fail_state("p1");
        f.tracker.set_state("p2", "M6");

        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent(), vec![("c1".to_string(), "change:M6".to_string())]);
        assert_eq!(f.repo.updates(), vec![(2, "M6".to_string())]);
    }

    #[tokio::test]
    async fn test_unknown_game_is_skipped() {
        let f = fixture();
        f.repo.add_player(1, "p1", "valorant", "M1");
        f.repo.add_player(2, "p2", "lol", "M1");
        f.repo.subscribe(2, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p2", "M2");

        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent().len(), 1);
        assert_eq!(f.repo.updates(), vec![(2, "M2".to_string())]);
    }

    #[tokio::test]
    async fn test_one_delivery_failure_does_not_block_other_guilds() {
        let f = fixture_with_sink(RecordingSink::failing(&["c1"]));
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.subscribe(1, "g2");
        f.repo.set_channel("g1", "c1");
        f.repo.set_channel("g2", "c2");
        f.tracker.set_state("p1", "M2");

        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent(), vec![("c2".to_string(), "change:M2".to_string())]);
        // State still persisted after the partial delivery failure.
        assert_eq!(f.repo.updates(), vec![(1, "M2".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_content_build_leaves_state_for_retry() {
        let repo = Arc::new(FakeRepo::default());
        let tracker = Arc::new(FakeTracker {
            fail_build: true,
            ..FakeTracker::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(Registry::new());
        registry.register(tracker.clone());
        let poller = Poller::new(
            repo.clone(),
            registry,
            sink.clone(),
            Duration::from_secs(90),
        );

        repo.add_player(1, "p1", "lol", "M1");
        repo.subscribe(1, "g1");
        repo.set_channel("g1", "c1");
        tracker.set_state("p1", "M2");

        poller.poll_pass().await;

        assert!(sink.sent().is_empty());
        assert!(repo.updates().is_empty());
    }

    #[tokio::test]
    async fn test_change_with_no_subscriptions_still_persists() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.tracker.set_state("p1", "M2");

        f.poller.poll_pass().await;

        assert!(f.sink.sent().is_empty());
        assert_eq!(f.repo.updates(), vec![(1, "M2".to_string())]);
    }

    #[tokio::test]
    async fn test_content_is_built_once_per_change() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.subscribe(1, "g2");
        f.repo.set_channel("g1", "c1");
        f.repo.set_channel("g2", "c2");
        f.tracker.set_state("p1", "M2");

        f.poller.poll_pass().await;

        assert_eq!(f.sink.sent().len(), 2);
        assert_eq!(f.tracker.builds.lock().unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_is_immediate() {
        let f = fixture();
        let poller = Arc::new(f.poller);
        let handle = poller.spawn(CancellationToken::new());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_runs_no_pass() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p1", "M2");

        let token = CancellationToken::new();
        token.cancel();
        f.poller.run(token).await;

        assert!(f.sink.sent().is_empty());
        assert!(f.repo.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_spawned_poller() {
        let f = fixture();
        let poller = Arc::new(f.poller);
        let parent = CancellationToken::new();
        let handle = poller.spawn(parent.clone());

        parent.cancel();
        // The task observes the parent through its child token and exits;
        // stop() then just joins it.
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticks_run_additional_passes() {
        let f = fixture();
        f.repo.add_player(1, "p1", "lol", "M1");
        f.repo.subscribe(1, "g1");
        f.repo.set_channel("g1", "c1");
        f.tracker.set_state("p1", "M2");

        let sink = f.sink.clone();
        let tracker = f.tracker.clone();
        let poller = Arc::new(f.poller);
        let handle = poller.spawn(CancellationToken::new());

        // Let the initial pass run.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.sent().len(), 1);

        // Next change picked up on the following tick (90s interval).
        tracker.set_state("p1", "M3");
        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(sink.sent().len(), 2);

        handle.stop().await;
    }
}
