mod common;

use common::{Call, harness, t};
use raidguard::{
    antiraid::{JoinOutcome, MessageEvent, MessageOutcome},
    db::GuildStore,
    notify::NotificationKind,
};
use tokio::task::JoinSet;

const G: u64 = 3;

fn msg(actor: u64, id: u64, secs: f64) -> MessageEvent {
    MessageEvent {
        guild_id: G,
        actor_id: actor,
        channel_id: 600,
        message_id: id,
        content: format!("flood {id}"),
        at: t(secs),
        is_bot: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_joins_activate_raid_mode_once() {
    let h = harness();

    let mut set = JoinSet::new();
    for i in 0..20u64 {
        let engine = h.engine.clone();
        set.spawn(async move { engine.on_actor_joined(G, 1_000 + i, t(1.0)).await });
    }
    let mut outcomes = Vec::new();
    while let Some(res) = set.join_next().await {
        outcomes.push(res.unwrap());
    }

    let recorded = outcomes.iter().filter(|o| **o == JoinOutcome::Recorded).count();
    let detected = outcomes.iter().filter(|o| matches!(o, JoinOutcome::RaidDetected { .. })).count();
    let during = outcomes.iter().filter(|o| matches!(o, JoinOutcome::PunishedDuringRaid(_))).count();
    assert_eq!((recorded, detected, during), (4, 1, 15));

    assert_eq!(
        h.sink.count(|k| matches!(k, NotificationKind::RaidModeActivated { .. })).await,
        1
    );
    assert_eq!(h.api.count(|c| matches!(c, Call::Kick { .. })).await, 16);
    assert!(h.engine.is_raid_active(G, t(2.0)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_bursts_move_the_ledger_once_each() {
    let h = harness();
    let actor = 77;

    for (round, start) in [0.0, 100.0, 200.0].into_iter().enumerate() {
        let mut set = JoinSet::new();
        for i in 0..5u64 {
            let engine = h.engine.clone();
            let id = round as u64 * 10 + i;
            set.spawn(async move { engine.on_message_created(msg(actor, id, start)).await });
        }
        let mut outcomes = Vec::new();
        while let Some(res) = set.join_next().await {
            outcomes.push(res.unwrap());
        }
        assert_eq!(outcomes.iter().filter(|o| **o == MessageOutcome::Recorded).count(), 4);

        let expected = match round {
            0 => MessageOutcome::Warned { count: 1, limit: 3 },
            1 => MessageOutcome::Warned { count: 2, limit: 3 },
            _ => outcomes
                .iter()
                .find(|o| matches!(o, MessageOutcome::Punished(_)))
                .cloned()
                .expect("third burst punishes"),
        };
        assert_eq!(outcomes.iter().filter(|o| **o == expected).count(), 1, "round {round}: {outcomes:?}");
        assert_eq!(h.engine.warning_count(G, actor).await, [1, 2, 0][round]);
    }

    assert_eq!(
        h.sink.count(|k| matches!(k, NotificationKind::SpamWarning { .. })).await,
        2
    );
    assert_eq!(h.api.count(|c| matches!(c, Call::Kick { .. })).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_and_config_changes_interleave_without_loss() {
    let h = harness();

    let mut set = JoinSet::new();
    for i in 0..10u64 {
        let engine = h.engine.clone();
        set.spawn(async move {
            engine.allow(G, 5_000 + i, None).await.unwrap();
        });
        let engine = h.engine.clone();
        set.spawn(async move {
            engine.add_banned_word(G, &format!("word{i}")).await.unwrap();
        });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap();
    }

    assert_eq!(h.engine.allow_list(G).await.len(), 10);
    assert_eq!(h.engine.banned_words(G).await.len(), 10);
    let stored = h.store.load_settings(G).await.unwrap().unwrap();
    assert_eq!(stored.banned_words.len(), 10);
}
