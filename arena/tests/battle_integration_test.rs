//! End-to-end battle flows through the public controller operations:
//! progressive elimination, masking and reveal, degraded rounds, timeout
//! bounds, and battle isolation.

use std::sync::Arc;
use std::time::Duration;

use arena::{
    AdapterError, AdapterRegistry, ArenaConfig, ArenaEvent, BattleController, EventBus,
    MemoryStore, ScriptedAdapter, VoteChoice,
};
use tokio::sync::broadcast;

fn config() -> ArenaConfig {
    let mut config = ArenaConfig::default();
    config.shuffle_pool = false;
    config.response_timeout = Duration::from_millis(300);
    config.fetch_attempts = 2;
    config
}

fn controller_with(
    adapters: Vec<ScriptedAdapter>,
    config: ArenaConfig,
) -> (BattleController, broadcast::Receiver<ArenaEvent>) {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(Arc::new(adapter)).unwrap();
    }
    let bus = EventBus::new().shared();
    let receiver = bus.subscribe();
    let controller = BattleController::with_registry(
        MemoryStore::new().shared(),
        bus,
        registry.shared(),
        config,
    );
    (controller, receiver)
}

async fn wait_for_event(
    receiver: &mut broadcast::Receiver<ArenaEvent>,
    event_type: &str,
) -> ArenaEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = receiver.recv().await.expect("event bus closed");
            if event.event_type() == event_type {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", event_type))
}

#[tokio::test]
async fn three_model_battle_runs_to_completion() {
    // Pool [m1, m2, m3]: round 1 pairs (m1, m2). Voting left then right
    // should crown m3 with final ranking [m3, m1, m2].
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "answer from one"),
            ScriptedAdapter::new("m2", "Model Two", "answer from two"),
            ScriptedAdapter::new("m3", "Model Three", "answer from three"),
        ],
        config(),
    );

    let handle = controller.start_battle("chat-1", "judge this").await.unwrap();
    wait_for_event(&mut rx, "responses_fetched").await;

    let round1 = controller.get_responses(&handle.battle_id).await.unwrap();
    assert_eq!(round1.round_number, 1);
    assert_eq!(round1.text_a.as_deref(), Some("answer from one"));
    assert_eq!(round1.text_b.as_deref(), Some("answer from two"));

    let first = controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Left)
        .await
        .unwrap();
    assert_eq!(first.eliminated, vec!["m2"]);
    assert_eq!(
        first.next_pair,
        Some(["m1".to_string(), "m3".to_string()])
    );
    assert!(first.winner.is_none());

    // The next round's fetch is kicked off by the vote itself.
    wait_for_event(&mut rx, "responses_fetched").await;

    let round2 = controller.get_responses(&handle.battle_id).await.unwrap();
    assert_eq!(round2.round_number, 2);
    assert_eq!(round2.text_a.as_deref(), Some("answer from one"));
    assert_eq!(round2.text_b.as_deref(), Some("answer from three"));

    let second = controller
        .submit_vote(&handle.battle_id, 2, VoteChoice::Right)
        .await
        .unwrap();
    assert_eq!(second.winner.as_deref(), Some("m3"));
    assert_eq!(
        second.final_ranking.as_deref(),
        Some(&["m3".to_string(), "m1".to_string(), "m2".to_string()][..])
    );

    // Two resolved rounds, zero-sum: total rating mass is unchanged.
    let board = controller.get_leaderboard().await.unwrap();
    assert_eq!(board.len(), 3);
    let total: f64 = board.iter().map(|entry| entry.elo_rating).sum();
    assert!((total - 4500.0).abs() < 1e-6);
    assert_eq!(board[0].model_id, "m3");

    let m1 = board.iter().find(|e| e.model_id == "m1").unwrap();
    assert_eq!(m1.battles_fought, 2);
    assert_eq!(m1.wins, 1);
    assert_eq!(m1.losses, 1);
    assert!((m1.win_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn first_win_at_defaults_gives_scenario_c_numbers() {
    // 1500 vs 1500 at K=32: winner 1516.0, loser 1484.0.
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "a"),
            ScriptedAdapter::new("m2", "Model Two", "b"),
        ],
        config(),
    );

    let handle = controller.start_battle("chat-1", "prompt").await.unwrap();
    wait_for_event(&mut rx, "responses_fetched").await;
    controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Left)
        .await
        .unwrap();

    let board = controller.get_leaderboard().await.unwrap();
    assert_eq!(board[0].model_id, "m1");
    assert!((board[0].elo_rating - 1516.0).abs() < 1e-9);
    assert!((board[1].elo_rating - 1484.0).abs() < 1e-9);
    assert!((board[0].win_rate - 1.0).abs() < 1e-9);
    assert_eq!(board[1].win_rate, 0.0);
}

#[tokio::test]
async fn unresponsive_side_degrades_the_round() {
    // m2 never answers within the bound; the round still reaches voting
    // with m1's text, and votes on the absent side are invalid.
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "only answer"),
            ScriptedAdapter::new("m2", "Model Two", "too late")
                .with_latency(Duration::from_secs(60)),
        ],
        config(),
    );

    let handle = controller.start_battle("chat-1", "prompt").await.unwrap();
    let fetched = wait_for_event(&mut rx, "responses_fetched").await;
    match fetched {
        ArenaEvent::ResponsesFetched {
            usable, degraded, ..
        } => {
            assert_eq!(usable, 1);
            assert!(degraded);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let round = controller.get_responses(&handle.battle_id).await.unwrap();
    assert_eq!(round.text_a.as_deref(), Some("only answer"));
    assert!(round.text_b.is_none());
    assert!(round.latency_b.is_none());

    let err = controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Right)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
    let err = controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Tie)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input");

    // Voting for the side that did answer works.
    let outcome = controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Left)
        .await
        .unwrap();
    assert_eq!(outcome.winner.as_deref(), Some("m1"));
}

#[tokio::test]
async fn fetch_completes_within_the_timeout_bound() {
    // One adapter hangs far beyond the bound; the round must settle within
    // timeout plus slack, not wait for the hung side.
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "fast"),
            ScriptedAdapter::new("m2", "Model Two", "hung")
                .with_latency(Duration::from_secs(600)),
        ],
        config(),
    );

    let started = std::time::Instant::now();
    controller.start_battle("chat-1", "prompt").await.unwrap();
    wait_for_event(&mut rx, "responses_fetched").await;
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn battle_fails_after_fetch_budget_is_exhausted() {
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "x")
                .with_failure(AdapterError::unavailable("backend down")),
            ScriptedAdapter::new("m2", "Model Two", "y")
                .with_failure(AdapterError::timeout("no answer")),
        ],
        config(),
    );

    let handle = controller.start_battle("chat-1", "prompt").await.unwrap();
    wait_for_event(&mut rx, "fetch_failed").await;
    wait_for_event(&mut rx, "battle_failed").await;

    // The failed battle accepts no votes and never touched ratings.
    let err = controller
        .submit_vote(&handle.battle_id, 1, VoteChoice::Left)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert!(controller.get_leaderboard().await.unwrap().is_empty());
}

#[tokio::test]
async fn battles_sharing_models_stay_isolated() {
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "one"),
            ScriptedAdapter::new("m2", "Model Two", "two"),
        ],
        config(),
    );

    let first = controller.start_battle("chat-1", "first prompt").await.unwrap();
    let second = controller.start_battle("chat-2", "second prompt").await.unwrap();
    assert_ne!(first.battle_id, second.battle_id);

    wait_for_event(&mut rx, "responses_fetched").await;
    wait_for_event(&mut rx, "responses_fetched").await;

    // Concluding the first battle leaves the second untouched.
    let outcome = controller
        .submit_vote(&first.battle_id, 1, VoteChoice::Left)
        .await
        .unwrap();
    assert_eq!(outcome.winner.as_deref(), Some("m1"));

    let round = controller.get_responses(&second.battle_id).await.unwrap();
    assert_eq!(round.round_number, 1);
    assert_eq!(round.text_a.as_deref(), Some("one"));

    let outcome = controller
        .submit_vote(&second.battle_id, 1, VoteChoice::Right)
        .await
        .unwrap();
    assert_eq!(outcome.winner.as_deref(), Some("m2"));

    // One win and one loss each: the shared ratings net out.
    let board = controller.get_leaderboard().await.unwrap();
    let m1 = board.iter().find(|e| e.model_id == "m1").unwrap();
    let m2 = board.iter().find(|e| e.model_id == "m2").unwrap();
    assert_eq!(m1.battles_fought, 2);
    assert_eq!(m2.battles_fought, 2);
    assert!((m1.elo_rating + m2.elo_rating - 3000.0).abs() < 1e-6);
}

#[tokio::test]
async fn expired_battles_are_swept_and_gone() {
    let mut cfg = config();
    cfg.retention = Duration::from_millis(250);
    let (controller, mut rx) = controller_with(
        vec![
            ScriptedAdapter::new("m1", "Model One", "a"),
            ScriptedAdapter::new("m2", "Model Two", "b"),
        ],
        cfg,
    );

    let handle = controller.start_battle("chat-1", "prompt").await.unwrap();
    wait_for_event(&mut rx, "responses_fetched").await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let gone = controller.sweep_expired().await.unwrap();
    assert_eq!(gone, vec![handle.battle_id.clone()]);

    let err = controller.get_responses(&handle.battle_id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
