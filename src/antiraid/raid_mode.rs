// src/antiraid/raid_mode.rs
//! Per-guild raid mode: `Normal` → `Active` → `Normal` (manual toggle or timed expiry).
//!
//! The deferred deactivation carries an [`ExpiryTicket`]. When it fires it only acts if the
//! guild is still on the same activation (same generation and `expires_at`); anything that
//! replaced that activation in the meantime makes the callback a no-op.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{GuildAbuseState, GuildStates};
use crate::notify::{Notification, NotificationKind, NotificationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryTicket {
    pub generation: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RaidModeState {
    active: bool,
    expires_at: Option<DateTime<Utc>>,
    generation: u64,
    /// Wygasło leniwie (is_active), a odroczony callback jeszcze nie wysłał alertu.
    lapsed: bool,
}

impl RaidModeState {
    /// `active && now < expires_at`; przeterminowany stan czyścimy od razu.
    pub fn is_active(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.expires_at {
            Some(exp) if now < exp => true,
            _ => {
                self.active = false;
                self.expires_at = None;
                self.lapsed = true;
                false
            }
        }
    }

    /// Jak `is_active`, ale bez samonaprawy (podgląd dla /antiraid status).
    pub fn peek_active(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_some_and(|exp| now < exp)
    }

    /// No-op gdy już aktywny.
    pub fn activate(&mut self, now: DateTime<Utc>, duration: Duration) -> Option<ExpiryTicket> {
        if self.is_active(now) {
            return None;
        }
        Some(self.rearm(now, duration))
    }

    /// Nowa aktywacja (także przy aktywnym trybie) – poprzedni ticket staje się nieaktualny.
    pub fn rearm(&mut self, now: DateTime<Utc>, duration: Duration) -> ExpiryTicket {
        self.generation = self.generation.wrapping_add(1);
        self.active = true;
        self.lapsed = false;
        let expires_at = now + duration;
        self.expires_at = Some(expires_at);
        ExpiryTicket { generation: self.generation, expires_at }
    }

    /// Ręczne wyłączenie. Zwraca czy tryb był aktywny.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        let was_active = self.is_active(now);
        self.active = false;
        self.expires_at = None;
        self.lapsed = false;
        was_active
    }

    /// Odroczone wyłączenie. `true` tylko dla aktywacji, na którą wystawiono ticket.
    pub fn expire(&mut self, ticket: ExpiryTicket) -> bool {
        if self.generation != ticket.generation {
            return false;
        }
        if self.active && self.expires_at == Some(ticket.expires_at) {
            self.active = false;
            self.expires_at = None;
            return true;
        }
        // leniwie wyczyszczone wcześniej – alert jeszcze się należy
        std::mem::take(&mut self.lapsed)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.filter(|_| self.active).map(|exp| exp - now).filter(|d| *d > Duration::zero())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Asynchroniczna część raid mode: planowanie wygaszenia i alerty.
#[derive(Clone)]
pub struct RaidModeController {
    states: GuildStates,
    notifier: Arc<dyn NotificationSink>,
}

impl RaidModeController {
    pub(crate) fn new(states: GuildStates, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { states, notifier }
    }

    /// Aktywacja na już zablokowanym stanie gildii. Alert wysyła wołający (po zwolnieniu locka).
    pub(crate) fn activate_locked(
        &self,
        guild_id: u64,
        raid: &mut RaidModeState,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<ExpiryTicket> {
        let ticket = raid.activate(now, duration)?;
        self.schedule_expiry(guild_id, ticket, now);
        Some(ticket)
    }

    pub(crate) fn rearm_locked(
        &self,
        guild_id: u64,
        raid: &mut RaidModeState,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> ExpiryTicket {
        let ticket = raid.rearm(now, duration);
        self.schedule_expiry(guild_id, ticket, now);
        ticket
    }

    /// `activate(guild, duration)` – idempotentne; `None` gdy tryb już trwał.
    pub async fn activate(
        &self,
        guild_id: u64,
        guild: &Mutex<GuildAbuseState>,
        duration: Duration,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Option<ExpiryTicket> {
        let ticket = {
            let mut st = guild.lock().await;
            self.activate_locked(guild_id, &mut st.raid, duration, now)?
        };
        self.announce_activation(guild_id, ticket, true, Vec::new(), reason, now).await;
        Some(ticket)
    }

    /// Ręczne włączenie z jawnym czasem: przy aktywnym trybie ustawia nowe wygaśnięcie.
    pub async fn force_activate(
        &self,
        guild_id: u64,
        guild: &Mutex<GuildAbuseState>,
        duration: Duration,
        now: DateTime<Utc>,
        reason: &str,
    ) -> ExpiryTicket {
        let ticket = {
            let mut st = guild.lock().await;
            self.rearm_locked(guild_id, &mut st.raid, duration, now)
        };
        self.announce_activation(guild_id, ticket, true, Vec::new(), reason, now).await;
        ticket
    }

    pub async fn deactivate(
        &self,
        guild_id: u64,
        guild: &Mutex<GuildAbuseState>,
        now: DateTime<Utc>,
    ) -> bool {
        let was_active = guild.lock().await.raid.deactivate(now);
        tracing::info!(guild_id, was_active, "raid mode disabled manually");
        self.notifier
            .emit(
                guild_id,
                Notification::new(
                    NotificationKind::RaidModeDeactivated { manual: true },
                    None,
                    "manual toggle",
                    now,
                ),
            )
            .await;
        was_active
    }

    pub async fn is_active(&self, guild: &Mutex<GuildAbuseState>, now: DateTime<Utc>) -> bool {
        guild.lock().await.raid.is_active(now)
    }

    pub(crate) async fn announce_activation(
        &self,
        guild_id: u64,
        ticket: ExpiryTicket,
        manual: bool,
        recent_joiners: Vec<u64>,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        tracing::warn!(
            guild_id,
            generation = ticket.generation,
            expires_at = %ticket.expires_at,
            manual,
            reason,
            "raid mode activated"
        );
        self.notifier
            .emit(
                guild_id,
                Notification::new(
                    NotificationKind::RaidModeActivated {
                        expires_at: ticket.expires_at,
                        manual,
                        recent_joiners,
                    },
                    None,
                    reason,
                    now,
                ),
            )
            .await;
    }

    fn schedule_expiry(&self, guild_id: u64, ticket: ExpiryTicket, now: DateTime<Utc>) {
        let delay = (ticket.expires_at - now).to_std().unwrap_or_default();
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.expire(guild_id, ticket).await;
        });
    }

    /// Callback odroczonego wyłączenia. Nieaktualny ticket → no-op.
    pub async fn expire(&self, guild_id: u64, ticket: ExpiryTicket) -> bool {
        let Some(guild) = self.states.get(&guild_id).map(|g| g.clone()) else {
            return false;
        };
        let expired = guild.lock().await.raid.expire(ticket);
        if !expired {
            tracing::debug!(guild_id, generation = ticket.generation, "stale raid mode expiry ignored");
            return false;
        }
        tracing::info!(guild_id, generation = ticket.generation, "raid mode expired");
        self.notifier
            .emit(
                guild_id,
                Notification::new(
                    NotificationKind::RaidModeDeactivated { manual: false },
                    None,
                    "raid mode duration elapsed",
                    ticket.expires_at,
                ),
            )
            .await;
        true
    }
}
