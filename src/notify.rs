// src/notify.rs
//! Structured alerts emitted by the anti-raid engine. Sinks decide where they go
//! (tracing, the guild's log channel, …).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::async_trait;

use crate::antiraid::policy::PunishmentKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    RaidModeActivated {
        expires_at: DateTime<Utc>,
        manual: bool,
        /// Ostatnio dołączający (dla moderatorów) – tylko przy detekcji.
        recent_joiners: Vec<u64>,
    },
    RaidModeDeactivated {
        manual: bool,
    },
    Punished {
        punishment: PunishmentKind,
    },
    PunishmentFailed {
        punishment: PunishmentKind,
        error: String,
    },
    SpamWarning {
        count: u32,
        limit: u32,
    },
    MessageFiltered {
        filter: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub actor: Option<u64>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, actor: Option<u64>, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { kind, actor, reason: reason.into(), at }
    }

    /// Krótki, czytelny opis (treść embeda / linia logu).
    pub fn describe(&self) -> String {
        let who = self
            .actor
            .map(|a| format!("<@{a}>"))
            .unwrap_or_else(|| "–".to_string());
        match &self.kind {
            NotificationKind::RaidModeActivated { expires_at, manual, .. } => format!(
                "Raid mode {} until <t:{}:T>: {}",
                if *manual { "enabled manually" } else { "activated" },
                expires_at.timestamp(),
                self.reason
            ),
            NotificationKind::RaidModeDeactivated { manual } => {
                if *manual {
                    "Raid mode disabled manually".to_string()
                } else {
                    "Raid mode expired and was disabled automatically".to_string()
                }
            }
            NotificationKind::Punished { punishment } => {
                format!("Applied `{punishment}` to {who}: {}", self.reason)
            }
            NotificationKind::PunishmentFailed { punishment, error } => {
                format!("could not apply `{punishment}` to {who}: {error}")
            }
            NotificationKind::SpamWarning { count, limit } => {
                format!("Spam warning {count}/{limit} for {who}")
            }
            NotificationKind::MessageFiltered { filter } => {
                format!("Removed a message from {who} ({filter})")
            }
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, guild_id: u64, notification: Notification);
}

/// Każde powiadomienie jako zdarzenie `tracing` – działa nawet bez kanału logów.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn emit(&self, guild_id: u64, n: Notification) {
        let kind = serde_json::to_string(&n.kind).unwrap_or_default();
        match &n.kind {
            NotificationKind::PunishmentFailed { .. } => tracing::warn!(
                target: "raidguard::alert",
                guild_id,
                actor_id = n.actor,
                reason = %n.reason,
                at = %n.at,
                %kind,
                "{}", n.describe()
            ),
            _ => tracing::info!(
                target: "raidguard::alert",
                guild_id,
                actor_id = n.actor,
                reason = %n.reason,
                at = %n.at,
                %kind,
                "{}", n.describe()
            ),
        }
    }
}

/// Rozsyła to samo powiadomienie do wielu ujść po kolei.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn emit(&self, guild_id: u64, notification: Notification) {
        for s in &self.sinks {
            s.emit(guild_id, notification.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_text_mentions_kind_and_actor() {
        let n = Notification::new(
            NotificationKind::PunishmentFailed {
                punishment: PunishmentKind::Ban,
                error: "insufficient permission".into(),
            },
            Some(42),
            "burst join detection",
            Utc::now(),
        );
        assert_eq!(n.describe(), "could not apply `ban` to <@42>: insufficient permission");
    }

    #[test]
    fn kind_serializes_with_tag() {
        let k = NotificationKind::SpamWarning { count: 1, limit: 3 };
        let v = serde_json::to_value(&k).unwrap();
        assert_eq!(v["type"], "spam_warning");
        assert_eq!(v["count"], 1);
    }
}
