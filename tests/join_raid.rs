mod common;

use chrono::Duration;
use common::{Call, harness, t};
use raidguard::{
    antiraid::{JoinOutcome, REASON_BURST_JOIN, REASON_RAID_ACTIVE},
    error::ModerationError,
    notify::NotificationKind,
    punish::PunishmentOutcome,
};

const G: u64 = 1;

#[tokio::test]
async fn fifth_join_in_ten_seconds_starts_raid_mode() {
    let h = harness();

    for (i, s) in [0.0, 2.0, 4.0, 6.0].into_iter().enumerate() {
        let out = h.engine.on_actor_joined(G, 10 + i as u64, t(s)).await;
        assert_eq!(out, JoinOutcome::Recorded);
    }

    let out = h.engine.on_actor_joined(G, 14, t(8.0)).await;
    assert_eq!(
        out,
        JoinOutcome::RaidDetected {
            expires_at: t(8.0) + Duration::minutes(30),
            punishment: PunishmentOutcome::Applied,
        }
    );
    assert!(h.engine.is_raid_active(G, t(8.5)).await);

    // kolejny join idzie ścieżką raid mode, bez liczenia okna
    let out = h.engine.on_actor_joined(G, 15, t(9.0)).await;
    assert_eq!(out, JoinOutcome::PunishedDuringRaid(PunishmentOutcome::Applied));

    let calls = h.api.calls().await;
    assert_eq!(
        calls,
        vec![
            Call::Kick { guild: G, actor: 14, reason: REASON_BURST_JOIN.into() },
            Call::Kick { guild: G, actor: 15, reason: REASON_RAID_ACTIVE.into() },
        ]
    );

    let kinds = h.sink.kinds().await;
    match &kinds[0] {
        NotificationKind::RaidModeActivated { expires_at, manual, recent_joiners } => {
            assert_eq!(*expires_at, t(1808.0));
            assert!(!manual);
            assert_eq!(recent_joiners, &vec![14, 13, 12, 11, 10]);
        }
        other => panic!("expected activation alert, got {other:?}"),
    }
    assert_eq!(h.store.punishments(G).len(), 2);
}

#[tokio::test]
async fn raid_mode_activates_once_for_a_long_burst() {
    let h = harness();
    for i in 0..20u64 {
        h.engine.on_actor_joined(G, 100 + i, t(i as f64 * 0.5)).await;
    }
    let activations = h
        .sink
        .count(|k| matches!(k, NotificationKind::RaidModeActivated { .. }))
        .await;
    assert_eq!(activations, 1);
    // pierwsze cztery przeszły, reszta ukarana
    assert_eq!(h.api.count(|c| matches!(c, Call::Kick { .. })).await, 16);
}

#[tokio::test]
async fn slow_joins_never_trigger() {
    let h = harness();
    for i in 0..30u64 {
        let out = h.engine.on_actor_joined(G, i, t(i as f64 * 3.0)).await;
        assert_eq!(out, JoinOutcome::Recorded);
    }
    assert!(h.api.calls().await.is_empty());
    assert!(h.sink.all().await.is_empty());
}

#[tokio::test]
async fn allow_listed_members_bypass_detection_and_raid_mode() {
    let h = harness();
    h.engine.allow(G, 7, Some(1)).await.unwrap();

    for i in 0..10 {
        let out = h.engine.on_actor_joined(G, 7, t(i as f64 * 0.1)).await;
        assert_eq!(out, JoinOutcome::Allowed);
    }
    assert!(!h.engine.is_raid_active(G, t(1.0)).await);

    h.engine.enable_raid_mode(G, None, t(2.0)).await.unwrap();
    assert_eq!(h.engine.on_actor_joined(G, 7, t(3.0)).await, JoinOutcome::Allowed);
    assert!(matches!(
        h.engine.on_actor_joined(G, 8, t(3.0)).await,
        JoinOutcome::PunishedDuringRaid(_)
    ));
    assert_eq!(h.api.count(|c| matches!(c, Call::Kick { actor: 7, .. })).await, 0);
}

#[tokio::test]
async fn permission_failure_is_swallowed_and_reported() {
    let h = harness();
    h.api.fail_on("kick", ModerationError::PermissionDenied).await;

    for (i, s) in [0.0, 1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        h.engine.on_actor_joined(G, 40 + i as u64, t(s)).await;
    }
    assert!(h.engine.is_raid_active(G, t(5.0)).await);

    let failed: Vec<String> = h
        .sink
        .all()
        .await
        .into_iter()
        .filter(|(_, n)| matches!(n.kind, NotificationKind::PunishmentFailed { .. }))
        .map(|(_, n)| n.describe())
        .collect();
    assert_eq!(failed, vec!["could not apply `kick` to <@44>: insufficient permission".to_string()]);
    assert!(h.store.punishments(G).is_empty());
}

#[tokio::test]
async fn raid_mode_is_inactive_at_expiry_even_before_callback() {
    let h = harness();
    for (i, s) in [0.0, 1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        h.engine.on_actor_joined(G, 60 + i as u64, t(s)).await;
    }
    assert!(h.engine.is_raid_active(G, t(1803.9)).await);
    assert!(!h.engine.is_raid_active(G, t(1804.0)).await);

    let out = h.engine.on_actor_joined(G, 99, t(1805.0)).await;
    assert_eq!(out, JoinOutcome::Recorded);
}

#[tokio::test]
async fn guilds_are_independent() {
    let h = harness();
    for i in 0..5u64 {
        h.engine.on_actor_joined(1, i, t(i as f64)).await;
        h.engine.on_actor_joined(2, 50 + i, t(i as f64 * 20.0)).await;
    }
    assert!(h.engine.is_raid_active(1, t(5.0)).await);
    assert!(!h.engine.is_raid_active(2, t(100.0)).await);
    assert!(h.sink.all().await.iter().all(|(gid, _)| *gid == 1));
}

#[tokio::test]
async fn configured_punishment_is_used() {
    let h = harness();
    h.engine.set_setting(G, "punishment", "ban").await.unwrap();
    h.engine.set_setting(G, "join_threshold", "2").await.unwrap();

    h.engine.on_actor_joined(G, 1, t(0.0)).await;
    h.engine.on_actor_joined(G, 2, t(1.0)).await;

    assert_eq!(
        h.api.calls().await,
        vec![Call::Ban { guild: G, actor: 2, reason: REASON_BURST_JOIN.into(), purge_days: 1 }]
    );
}
