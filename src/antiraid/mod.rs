// src/antiraid/mod.rs
//! Silnik anty-raid: detekcja masowych joinów i spamu, raid mode, eskalacja ostrzeżeń.
//!
//! Stan każdej gildii (`GuildAbuseState`) siedzi za własnym `tokio::sync::Mutex`:
//! decyzja zapada pod lockiem, efekty uboczne (kick/ban/rola/wiadomości/alerty) już po
//! jego zwolnieniu. Gildie są od siebie niezależne.

pub mod allowlist;
pub mod commands;
pub mod filters;
pub mod policy;
pub mod raid_mode;
pub mod warnings;
pub mod window;

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration as StdDuration,
};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OnceCell};

use self::{
    allowlist::AllowList,
    filters::{ContentFilters, FilterHit},
    policy::{
        JOIN_WINDOW_CAPACITY, MAX_INTERVAL_SECS, MAX_RAID_MODE_MINUTES, MESSAGE_WINDOW_CAPACITY,
        PolicyConfig, ProtectionPreset, PunishmentKind,
    },
    raid_mode::{ExpiryTicket, RaidModeController, RaidModeState},
    warnings::{Escalation, WarningLedger},
    window::WindowTracker,
};
use crate::{
    config::AntiRaidConfig,
    db::{GuildSettings, GuildStore},
    error::ConfigError,
    notify::{Notification, NotificationKind, NotificationSink},
    punish::{ModerationApi, PunishmentDispatcher, PunishmentOutcome},
};

pub const REASON_RAID_ACTIVE: &str = "raid mode active";
pub const REASON_BURST_JOIN: &str = "burst join detection";
pub const REASON_SPAM: &str = "excessive spam";

pub(crate) type GuildStates = Arc<DashMap<u64, Arc<Mutex<GuildAbuseState>>>>;

/// Cały stan anty-raid jednej gildii.
#[derive(Debug, Clone)]
pub struct GuildAbuseState {
    pub guild_id: u64,
    pub settings: PolicyConfig,
    /// Słowa dokładane przez gildię (znormalizowane).
    pub banned_words: Vec<String>,
    pub raid: RaidModeState,
    pub allow_list: AllowList,
    /// Wspólny bufor joinów całej gildii.
    pub join_window: WindowTracker,
    /// Bufor wiadomości per użytkownik.
    pub message_windows: HashMap<u64, WindowTracker>,
    pub warnings: WarningLedger,
}

impl GuildAbuseState {
    pub fn new(guild_id: u64, settings: PolicyConfig) -> Self {
        Self {
            guild_id,
            settings,
            banned_words: Vec::new(),
            raid: RaidModeState::default(),
            allow_list: AllowList::default(),
            join_window: WindowTracker::with_capacity(JOIN_WINDOW_CAPACITY),
            message_windows: HashMap::new(),
            warnings: WarningLedger::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Na allow-liście – nic nie mierzymy.
    Allowed,
    /// Zapisany w oknie, bez reakcji.
    Recorded,
    /// Raid mode już trwał – kara bez ponownego liczenia okna.
    PunishedDuringRaid(PunishmentOutcome),
    /// Ten join domknął burst: raid mode włączony, dołączający ukarany.
    RaidDetected {
        expires_at: DateTime<Utc>,
        punishment: PunishmentOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Wiadomość bota.
    Ignored,
    Allowed,
    Filtered(FilterHit),
    Recorded,
    Warned { count: u32, limit: u32 },
    Punished(PunishmentOutcome),
}

/// Wiadomość widziana przez detektor spamu.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: u64,
    pub actor_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub content: String,
    pub at: DateTime<Utc>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaidToggle {
    Activated(ExpiryTicket),
    AlreadyActive { expires_at: Option<DateTime<Utc>> },
}

/// Podgląd dla `/antiraid status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildStatus {
    pub policy: PolicyConfig,
    pub raid_active: bool,
    pub raid_expires_at: Option<DateTime<Utc>>,
    pub raid_remaining: Option<Duration>,
    pub allow_listed: usize,
    pub banned_words: usize,
    pub tracked_actors: usize,
    pub warned_actors: usize,
}

enum JoinDecision {
    PunishDuringRaid(PunishmentKind),
    Raid {
        ticket: ExpiryTicket,
        recent_joiners: Vec<u64>,
        punishment: PunishmentKind,
    },
}

enum SpamDecision {
    Filtered(FilterHit),
    Warn { count: u32, limit: u32 },
    Punish(PunishmentKind),
}

pub struct AntiRaid {
    states: GuildStates,
    loading: DashMap<u64, Arc<OnceCell<Arc<Mutex<GuildAbuseState>>>>>,
    raid: RaidModeController,
    dispatcher: PunishmentDispatcher,
    notifier: Arc<dyn NotificationSink>,
    api: Arc<dyn ModerationApi>,
    store: Arc<dyn GuildStore>,
    filters: ContentFilters,
    defaults: PolicyConfig,
    warning_ttl: StdDuration,
}

impl AntiRaid {
    pub fn new(
        cfg: &AntiRaidConfig,
        api: Arc<dyn ModerationApi>,
        notifier: Arc<dyn NotificationSink>,
        store: Arc<dyn GuildStore>,
    ) -> Arc<Self> {
        let states: GuildStates = Arc::new(DashMap::new());
        let dispatcher = PunishmentDispatcher::new(
            api.clone(),
            notifier.clone(),
            store.clone(),
            cfg.mute_role_name.clone(),
            cfg.ban_purge_days,
        );
        Arc::new(Self {
            raid: RaidModeController::new(states.clone(), notifier.clone()),
            states,
            loading: DashMap::new(),
            dispatcher,
            notifier,
            api,
            store,
            filters: ContentFilters::new(&cfg.banned_words, cfg.block_links, &cfg.allowed_link_domains),
            defaults: cfg.defaults.clone(),
            warning_ttl: StdDuration::from_secs(cfg.warning_ttl_secs),
        })
    }

    pub fn raid_mode(&self) -> &RaidModeController {
        &self.raid
    }

    /* ===================== Stan gildii ===================== */

    /// Stan gildii; przy pierwszym użyciu wczytany ze store'u (dokładnie raz).
    pub async fn guild(&self, guild_id: u64) -> Arc<Mutex<GuildAbuseState>> {
        if let Some(g) = self.states.get(&guild_id) {
            return g.clone();
        }
        let cell = self.loading.entry(guild_id).or_default().clone();
        let loaded = cell.get_or_init(|| self.load_guild(guild_id)).await.clone();
        let g = self.states.entry(guild_id).or_insert(loaded).clone();
        self.loading.remove(&guild_id);
        g
    }

    /// Wczytanie stanu przy `guild_create`, żeby pierwszy join nie czekał na bazę.
    pub async fn warmup(&self, guild_id: u64) {
        self.guild(guild_id).await;
    }

    async fn load_guild(&self, guild_id: u64) -> Arc<Mutex<GuildAbuseState>> {
        let mut st = GuildAbuseState::new(guild_id, self.defaults.clone());
        match self.store.load_settings(guild_id).await {
            Ok(Some(stored)) => match stored.policy.validate() {
                Ok(()) => {
                    st.settings = stored.policy;
                    st.banned_words = filters::normalize_words(&stored.banned_words);
                }
                Err(e) => {
                    tracing::warn!(error = %e, guild_id, "stored policy invalid, using defaults");
                    st.banned_words = filters::normalize_words(&stored.banned_words);
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = ?e, guild_id, "failed to load guild settings, using defaults"),
        }
        match self.store.load_allowlist(guild_id).await {
            Ok(ids) => st.allow_list = AllowList::from_ids(ids),
            Err(e) => tracing::warn!(error = ?e, guild_id, "failed to load allow-list"),
        }
        tracing::debug!(guild_id, allow_listed = st.allow_list.len(), "guild anti-raid state created");
        Arc::new(Mutex::new(st))
    }

    /// Zapis do store'a, dopiero potem podmiana w pamięci. Lock gildii trzymamy przez
    /// cały zapis, żeby równoległe zmiany konfiguracji nie nadpisały się nawzajem.
    async fn commit(
        &self,
        st: &mut GuildAbuseState,
        policy: PolicyConfig,
        banned_words: Option<Vec<String>>,
    ) -> Result<()> {
        let stored = GuildSettings {
            policy,
            banned_words: banned_words.unwrap_or_else(|| st.banned_words.clone()),
        };
        self.store.save_settings(st.guild_id, &stored).await?;
        st.settings = stored.policy;
        st.banned_words = stored.banned_words;
        Ok(())
    }

    /* ===================== Joiny ===================== */

    pub async fn on_actor_joined(&self, guild_id: u64, actor_id: u64, at: DateTime<Utc>) -> JoinOutcome {
        let guild = self.guild(guild_id).await;
        let decision = {
            let mut guard = guild.lock().await;
            let st = &mut *guard;
            if st.allow_list.contains(actor_id) {
                return JoinOutcome::Allowed;
            }
            st.join_window.record(actor_id, at);
            let punishment = st.settings.punishment;

            if st.raid.is_active(at) {
                JoinDecision::PunishDuringRaid(punishment)
            } else if st
                .join_window
                .is_burst(st.settings.join_threshold, st.settings.join_interval())
            {
                let duration = st.settings.raid_mode_duration();
                match self.raid.activate_locked(guild_id, &mut st.raid, duration, at) {
                    Some(ticket) => JoinDecision::Raid {
                        ticket,
                        recent_joiners: st.join_window.recent_actors(st.settings.join_threshold as usize),
                        punishment,
                    },
                    None => JoinDecision::PunishDuringRaid(punishment),
                }
            } else {
                return JoinOutcome::Recorded;
            }
        };

        match decision {
            JoinDecision::PunishDuringRaid(kind) => {
                tracing::info!(guild_id, actor_id, "join during raid mode");
                let res = self.dispatcher.apply(guild_id, actor_id, kind, REASON_RAID_ACTIVE, at).await;
                JoinOutcome::PunishedDuringRaid(res)
            }
            JoinDecision::Raid { ticket, recent_joiners, punishment } => {
                self.raid
                    .announce_activation(guild_id, ticket, false, recent_joiners, REASON_BURST_JOIN, at)
                    .await;
                let res = self
                    .dispatcher
                    .apply(guild_id, actor_id, punishment, REASON_BURST_JOIN, at)
                    .await;
                JoinOutcome::RaidDetected { expires_at: ticket.expires_at, punishment: res }
            }
        }
    }

    /* ===================== Wiadomości ===================== */

    pub async fn on_message_created(&self, ev: MessageEvent) -> MessageOutcome {
        if ev.is_bot {
            return MessageOutcome::Ignored;
        }
        let (guild_id, actor_id) = (ev.guild_id, ev.actor_id);
        let guild = self.guild(guild_id).await;
        let decision = {
            let mut guard = guild.lock().await;
            let st = &mut *guard;
            if st.allow_list.contains(actor_id) {
                return MessageOutcome::Allowed;
            }
            if let Some(hit) = self.filters.check(&ev.content, &st.banned_words) {
                SpamDecision::Filtered(hit)
            } else {
                let window = st
                    .message_windows
                    .entry(actor_id)
                    .or_insert_with(|| WindowTracker::with_capacity(MESSAGE_WINDOW_CAPACITY));
                window.record(actor_id, ev.at);
                if !window.is_burst(st.settings.message_threshold, st.settings.message_interval()) {
                    return MessageOutcome::Recorded;
                }
                match st.warnings.escalate(actor_id) {
                    Escalation::Warn { count, limit } => SpamDecision::Warn { count, limit },
                    Escalation::Punish => SpamDecision::Punish(st.settings.punishment),
                }
            }
        };

        match decision {
            SpamDecision::Filtered(hit) => {
                tracing::info!(guild_id, actor_id, filter = hit.as_str(), "message filtered");
                self.delete_and_warn(&ev, &hit.warning_text(actor_id)).await;
                self.notifier
                    .emit(
                        guild_id,
                        Notification::new(
                            NotificationKind::MessageFiltered { filter: hit.as_str().to_string() },
                            Some(actor_id),
                            format!("{} in <#{}>", hit.as_str(), ev.channel_id),
                            ev.at,
                        ),
                    )
                    .await;
                MessageOutcome::Filtered(hit)
            }
            SpamDecision::Warn { count, limit } => {
                tracing::info!(guild_id, actor_id, count, limit, "spam burst, warning issued");
                let text = format!("<@{actor_id}> stop spamming! Warning: {count}/{limit}");
                self.delete_and_warn(&ev, &text).await;
                self.notifier
                    .emit(
                        guild_id,
                        Notification::new(
                            NotificationKind::SpamWarning { count, limit },
                            Some(actor_id),
                            "message burst",
                            ev.at,
                        ),
                    )
                    .await;
                MessageOutcome::Warned { count, limit }
            }
            SpamDecision::Punish(kind) => {
                let res = self.dispatcher.apply(guild_id, actor_id, kind, REASON_SPAM, ev.at).await;
                MessageOutcome::Punished(res)
            }
        }
    }

    /// Best-effort: brak uprawnień przy usuwaniu/wysyłce tylko logujemy.
    async fn delete_and_warn(&self, ev: &MessageEvent, text: &str) {
        if let Err(e) = self.api.delete_message(ev.channel_id, ev.message_id).await {
            tracing::warn!(error = %e, guild_id = ev.guild_id, channel_id = ev.channel_id, "could not delete message");
        }
        if let Err(e) = self.api.send_transient(ev.channel_id, text, self.warning_ttl).await {
            tracing::warn!(error = %e, guild_id = ev.guild_id, channel_id = ev.channel_id, "could not post warning");
        }
    }

    /* ===================== Konfiguracja ===================== */

    pub async fn policy(&self, guild_id: u64) -> PolicyConfig {
        self.guild(guild_id).await.lock().await.settings.clone()
    }

    pub async fn set_setting(&self, guild_id: u64, name: &str, value: &str) -> Result<PolicyConfig> {
        let guild = self.guild(guild_id).await;
        let mut st = guild.lock().await;
        let mut policy = st.settings.clone();
        policy.set_field(name, value)?;
        self.commit(&mut st, policy.clone(), None).await?;
        tracing::info!(guild_id, setting = name, value, "anti-raid setting changed");
        Ok(policy)
    }

    pub async fn apply_preset(
        &self,
        guild_id: u64,
        preset: ProtectionPreset,
        punishment: Option<PunishmentKind>,
        raid_mode_duration_min: Option<u64>,
    ) -> Result<PolicyConfig> {
        let guild = self.guild(guild_id).await;
        let mut st = guild.lock().await;
        let policy = preset.apply(&st.settings, punishment, raid_mode_duration_min)?;
        self.commit(&mut st, policy.clone(), None).await?;
        tracing::info!(guild_id, preset = preset.as_str(), "anti-raid preset applied");
        Ok(policy)
    }

    /// `true` gdy aktor został dopisany (nie było go wcześniej).
    pub async fn allow(&self, guild_id: u64, actor_id: u64, added_by: Option<u64>) -> Result<bool> {
        self.store.allowlist_add(guild_id, actor_id, added_by).await?;
        let added = self.guild(guild_id).await.lock().await.allow_list.add(actor_id);
        tracing::info!(guild_id, actor_id, ?added_by, added, "allow-list add");
        Ok(added)
    }

    pub async fn disallow(&self, guild_id: u64, actor_id: u64) -> Result<bool> {
        self.store.allowlist_remove(guild_id, actor_id).await?;
        let removed = self.guild(guild_id).await.lock().await.allow_list.remove(actor_id);
        tracing::info!(guild_id, actor_id, removed, "allow-list remove");
        Ok(removed)
    }

    pub async fn allow_list(&self, guild_id: u64) -> Vec<u64> {
        self.guild(guild_id).await.lock().await.allow_list.list()
    }

    pub async fn add_banned_word(&self, guild_id: u64, word: &str) -> Result<bool> {
        let word = filters::normalize(word.trim());
        if word.is_empty() {
            return Ok(false);
        }
        let guild = self.guild(guild_id).await;
        let mut st = guild.lock().await;
        if st.banned_words.contains(&word) {
            return Ok(false);
        }
        let mut words = st.banned_words.clone();
        words.push(word);
        words.sort();
        let policy = st.settings.clone();
        self.commit(&mut st, policy, Some(words)).await?;
        Ok(true)
    }

    pub async fn remove_banned_word(&self, guild_id: u64, word: &str) -> Result<bool> {
        let word = filters::normalize(word.trim());
        let guild = self.guild(guild_id).await;
        let mut st = guild.lock().await;
        if !st.banned_words.contains(&word) {
            return Ok(false);
        }
        let words: Vec<String> = st.banned_words.iter().filter(|w| **w != word).cloned().collect();
        let policy = st.settings.clone();
        self.commit(&mut st, policy, Some(words)).await?;
        Ok(true)
    }

    pub async fn banned_words(&self, guild_id: u64) -> Vec<String> {
        self.guild(guild_id).await.lock().await.banned_words.clone()
    }

    /// Ręczne włączenie. `minutes = Some(..)` nadpisuje czas także przy aktywnym trybie.
    pub async fn enable_raid_mode(
        &self,
        guild_id: u64,
        minutes: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<RaidToggle, ConfigError> {
        let guild = self.guild(guild_id).await;
        match minutes {
            Some(m) => {
                if m == 0 || m > MAX_RAID_MODE_MINUTES {
                    return Err(ConfigError::OutOfRange {
                        field: "raid_mode_duration",
                        min: 1,
                        max: MAX_RAID_MODE_MINUTES,
                        value: m,
                    });
                }
                let ticket = self
                    .raid
                    .force_activate(guild_id, &guild, Duration::minutes(m as i64), now, "manual override")
                    .await;
                Ok(RaidToggle::Activated(ticket))
            }
            None => {
                let duration = guild.lock().await.settings.raid_mode_duration();
                match self.raid.activate(guild_id, &guild, duration, now, "manual toggle").await {
                    Some(ticket) => Ok(RaidToggle::Activated(ticket)),
                    None => Ok(RaidToggle::AlreadyActive {
                        expires_at: guild.lock().await.raid.expires_at(),
                    }),
                }
            }
        }
    }

    pub async fn disable_raid_mode(&self, guild_id: u64, now: DateTime<Utc>) -> bool {
        let guild = self.guild(guild_id).await;
        self.raid.deactivate(guild_id, &guild, now).await
    }

    pub async fn is_raid_active(&self, guild_id: u64, now: DateTime<Utc>) -> bool {
        let guild = self.guild(guild_id).await;
        self.raid.is_active(&guild, now).await
    }

    pub async fn warning_count(&self, guild_id: u64, actor_id: u64) -> u32 {
        self.guild(guild_id).await.lock().await.warnings.count(actor_id)
    }

    pub async fn status(&self, guild_id: u64, now: DateTime<Utc>) -> GuildStatus {
        let guild = self.guild(guild_id).await;
        let st = guild.lock().await;
        let raid_active = st.raid.peek_active(now);
        GuildStatus {
            policy: st.settings.clone(),
            raid_active,
            raid_expires_at: st.raid.expires_at().filter(|_| raid_active),
            raid_remaining: st.raid.remaining(now),
            allow_listed: st.allow_list.len(),
            banned_words: st.banned_words.len(),
            tracked_actors: st.message_windows.len(),
            warned_actors: st.warnings.len(),
        }
    }

    /* ===================== Sprzątanie ===================== */

    pub fn spawn_prune_task(this: &Arc<Self>, every: StdDuration) {
        let weak: Weak<Self> = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Some(strong) = weak.upgrade() {
                    let removed = strong.prune_idle(Utc::now()).await;
                    if removed > 0 {
                        tracing::debug!(removed, "idle message windows pruned");
                    }
                } else {
                    break;
                }
            }
        });
    }

    /// Usuwa bufory wiadomości, których najnowszy wpis jest starszy niż najdłuższy możliwy
    /// interwał – taki bufor nie może już dać burstu. Liczniki ostrzeżeń zostają.
    pub async fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let horizon = Duration::seconds(MAX_INTERVAL_SECS as i64);
        let guilds: Vec<_> = self.states.iter().map(|e| e.value().clone()).collect();
        let mut removed = 0;
        for guild in guilds {
            let mut st = guild.lock().await;
            let before = st.message_windows.len();
            st.message_windows
                .retain(|_, w| w.newest().is_some_and(|t| now - t <= horizon));
            removed += before - st.message_windows.len();
        }
        removed
    }
}
