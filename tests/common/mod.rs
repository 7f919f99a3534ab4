#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::bail;
use chrono::{DateTime, TimeZone, Utc};
use raidguard::{
    antiraid::AntiRaid,
    config::AntiRaidConfig,
    db::{GuildSettings, GuildStore, PunishmentRecord, memory::MemoryStore},
    error::ModerationError,
    notify::{Notification, NotificationKind, NotificationSink},
    punish::{ChannelDeny, ModerationApi},
};
use serenity::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Kick { guild: u64, actor: u64, reason: String },
    Ban { guild: u64, actor: u64, reason: String, purge_days: u8 },
    EnsureRole { guild: u64, name: String },
    GuildChannels { guild: u64 },
    SetChannelPermission { channel: u64, role: u64, deny: ChannelDeny },
    AddRole { guild: u64, actor: u64, role: u64 },
    DeleteMessage { channel: u64, message: u64 },
    SendTransient { channel: u64, text: String, ttl: Duration },
    TransientRemoved { channel: u64, text: String },
}

/// Platforma w pamięci: zapisuje wywołania, błędy wstrzykiwane per operacja.
pub struct MockModeration {
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Mutex<HashMap<&'static str, ModerationError>>,
    channels: Vec<u64>,
    role_id: u64,
}

impl Default for MockModeration {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(HashMap::new()),
            channels: vec![100, 101, 102],
            role_id: 900,
        }
    }
}

impl MockModeration {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_on(&self, op: &'static str, err: ModerationError) {
        self.failures.lock().await.insert(op, err);
    }

    pub async fn clear_failure(&self, op: &'static str) {
        self.failures.lock().await.remove(op);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| pred(c)).count()
    }

    async fn record(&self, op: &'static str, call: Call) -> Result<(), ModerationError> {
        self.calls.lock().await.push(call);
        match self.failures.lock().await.get(op) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ModerationApi for MockModeration {
    async fn kick(&self, guild_id: u64, actor_id: u64, reason: &str) -> Result<(), ModerationError> {
        self.record("kick", Call::Kick { guild: guild_id, actor: actor_id, reason: reason.into() })
            .await
    }

    async fn ban(&self, guild_id: u64, actor_id: u64, reason: &str, purge_days: u8) -> Result<(), ModerationError> {
        self.record(
            "ban",
            Call::Ban { guild: guild_id, actor: actor_id, reason: reason.into(), purge_days },
        )
        .await
    }

    async fn ensure_role(&self, guild_id: u64, name: &str) -> Result<u64, ModerationError> {
        self.record("ensure_role", Call::EnsureRole { guild: guild_id, name: name.into() })
            .await?;
        // oddaj sterowanie – inne zadania mogą się wtrącić w trakcie tworzenia roli
        tokio::task::yield_now().await;
        Ok(self.role_id)
    }

    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<u64>, ModerationError> {
        self.record("guild_channels", Call::GuildChannels { guild: guild_id }).await?;
        Ok(self.channels.clone())
    }

    async fn set_channel_permission(
        &self,
        channel_id: u64,
        role_id: u64,
        deny: ChannelDeny,
    ) -> Result<(), ModerationError> {
        self.record(
            "set_channel_permission",
            Call::SetChannelPermission { channel: channel_id, role: role_id, deny },
        )
        .await
    }

    async fn add_role(&self, guild_id: u64, actor_id: u64, role_id: u64, _reason: &str) -> Result<(), ModerationError> {
        self.record("add_role", Call::AddRole { guild: guild_id, actor: actor_id, role: role_id })
            .await
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ModerationError> {
        self.record("delete_message", Call::DeleteMessage { channel: channel_id, message: message_id })
            .await
    }

    async fn send_transient(&self, channel_id: u64, text: &str, ttl: Duration) -> Result<(), ModerationError> {
        self.record(
            "send_transient",
            Call::SendTransient { channel: channel_id, text: text.into(), ttl },
        )
        .await?;
        let calls = self.calls.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            calls.lock().await.push(Call::TransientRemoved { channel: channel_id, text });
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<(u64, Notification)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn all(&self) -> Vec<(u64, Notification)> {
        self.seen.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<NotificationKind> {
        self.seen.lock().await.iter().map(|(_, n)| n.kind.clone()).collect()
    }

    pub async fn count(&self, pred: impl Fn(&NotificationKind) -> bool) -> usize {
        self.seen.lock().await.iter().filter(|(_, n)| pred(&n.kind)).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn emit(&self, guild_id: u64, notification: Notification) {
        self.seen.lock().await.push((guild_id, notification));
    }
}

pub struct Harness {
    pub engine: Arc<AntiRaid>,
    pub api: Arc<MockModeration>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
}

pub fn harness() -> Harness {
    harness_with(AntiRaidConfig::default())
}

pub fn harness_with(cfg: AntiRaidConfig) -> Harness {
    harness_with_store(cfg, Arc::new(MemoryStore::new()))
}

pub fn harness_with_store(cfg: AntiRaidConfig, store: Arc<MemoryStore>) -> Harness {
    let api = MockModeration::new();
    let sink = RecordingSink::new();
    let engine = AntiRaid::new(&cfg, api.clone(), sink.clone(), store.clone() as Arc<dyn GuildStore>);
    Harness { engine, api, sink, store }
}

/// Store, któremu można wyłączyć zapisy (odczyty zawsze działają).
#[derive(Default)]
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("db down");
        }
        Ok(())
    }
}

#[async_trait]
impl GuildStore for FlakyStore {
    async fn load_settings(&self, guild_id: u64) -> anyhow::Result<Option<GuildSettings>> {
        self.inner.load_settings(guild_id).await
    }

    async fn save_settings(&self, guild_id: u64, settings: &GuildSettings) -> anyhow::Result<()> {
        self.check()?;
        self.inner.save_settings(guild_id, settings).await
    }

    async fn load_allowlist(&self, guild_id: u64) -> anyhow::Result<Vec<u64>> {
        self.inner.load_allowlist(guild_id).await
    }

    async fn allowlist_add(&self, guild_id: u64, actor_id: u64, added_by: Option<u64>) -> anyhow::Result<()> {
        self.check()?;
        self.inner.allowlist_add(guild_id, actor_id, added_by).await
    }

    async fn allowlist_remove(&self, guild_id: u64, actor_id: u64) -> anyhow::Result<()> {
        self.check()?;
        self.inner.allowlist_remove(guild_id, actor_id).await
    }

    async fn record_punishment(&self, record: &PunishmentRecord) -> anyhow::Result<()> {
        self.inner.record_punishment(record).await
    }
}

pub fn harness_with_flaky_store(cfg: AntiRaidConfig) -> (Harness, Arc<FlakyStore>) {
    let flaky = Arc::new(FlakyStore::default());
    let api = MockModeration::new();
    let sink = RecordingSink::new();
    let engine = AntiRaid::new(&cfg, api.clone(), sink.clone(), flaky.clone() as Arc<dyn GuildStore>);
    let store = flaky.inner.clone();
    (Harness { engine, api, sink, store }, flaky)
}

/// Stały punkt odniesienia + przesunięcie w sekundach (ułamki dozwolone).
pub fn t(secs: f64) -> DateTime<Utc> {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    base + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}
