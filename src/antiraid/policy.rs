// src/antiraid/policy.rs
//! Per-guild tunables for the detectors. Read-only for detection; every change goes through
//! [`PolicyConfig::validate`] / [`PolicyConfig::set_field`] first.

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pojemność bufora joinów (wspólny na gildię). Próg nie może jej przekroczyć.
pub const JOIN_WINDOW_CAPACITY: usize = 50;
/// Pojemność bufora wiadomości (per użytkownik).
pub const MESSAGE_WINDOW_CAPACITY: usize = 50;
pub const MAX_INTERVAL_SECS: u64 = 3_600;
pub const MAX_RAID_MODE_MINUTES: u64 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    Kick,
    Ban,
    Mute,
}

impl PunishmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Ban => "ban",
            Self::Mute => "mute",
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishmentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kick" => Ok(Self::Kick),
            "ban" => Ok(Self::Ban),
            "mute" => Ok(Self::Mute),
            other => Err(ConfigError::UnknownPunishment(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub join_threshold: u32,
    pub join_interval_secs: u64,
    pub message_threshold: u32,
    pub message_interval_secs: u64,
    pub punishment: PunishmentKind,
    pub raid_mode_duration_min: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            join_threshold: 5,
            join_interval_secs: 10,
            message_threshold: 5,
            message_interval_secs: 3,
            punishment: PunishmentKind::Kick,
            raid_mode_duration_min: 30,
        }
    }
}

impl PolicyConfig {
    /// Wszystkie pola liczbowe > 0, progi ≤ pojemność buforów.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("join_threshold", self.join_threshold as u64, 1, JOIN_WINDOW_CAPACITY as u64)?;
        check_range("join_interval", self.join_interval_secs, 1, MAX_INTERVAL_SECS)?;
        check_range(
            "message_threshold",
            self.message_threshold as u64,
            1,
            MESSAGE_WINDOW_CAPACITY as u64,
        )?;
        check_range("message_interval", self.message_interval_secs, 1, MAX_INTERVAL_SECS)?;
        check_range("raid_mode_duration", self.raid_mode_duration_min, 1, MAX_RAID_MODE_MINUTES)?;
        Ok(())
    }

    /// Zmiana jednego pola po nazwie (`/antiraid set`). Przy błędzie konfiguracja zostaje bez zmian.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        let key = name.trim().to_lowercase();
        match key.as_str() {
            "join_threshold" => next.join_threshold = saturate_u32(parse_number(&key, value)?),
            "join_interval" => next.join_interval_secs = parse_number(&key, value)?,
            "message_threshold" => next.message_threshold = saturate_u32(parse_number(&key, value)?),
            "message_interval" => next.message_interval_secs = parse_number(&key, value)?,
            "raid_mode_duration" => next.raid_mode_duration_min = parse_number(&key, value)?,
            "punishment" => next.punishment = value.parse()?,
            _ => return Err(ConfigError::UnknownSetting(name.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn join_interval(&self) -> Duration {
        Duration::seconds(self.join_interval_secs as i64)
    }

    pub fn message_interval(&self) -> Duration {
        Duration::seconds(self.message_interval_secs as i64)
    }

    pub fn raid_mode_duration(&self) -> Duration {
        Duration::minutes(self.raid_mode_duration_min as i64)
    }
}

pub const SETTING_NAMES: [&str; 6] = [
    "join_threshold",
    "join_interval",
    "message_threshold",
    "message_interval",
    "punishment",
    "raid_mode_duration",
];

/// Gotowe zestawy progów (normal / strict / very_strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionPreset {
    Normal,
    Strict,
    VeryStrict,
}

impl ProtectionPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Strict => "strict",
            Self::VeryStrict => "very_strict",
        }
    }

    /// Nadpisuje progi; kara i czas raid mode zostają, chyba że podano je jawnie.
    pub fn apply(
        &self,
        policy: &PolicyConfig,
        punishment: Option<PunishmentKind>,
        raid_mode_duration_min: Option<u64>,
    ) -> Result<PolicyConfig, ConfigError> {
        let (jt, ji, mt, mi) = match self {
            Self::Normal => (5, 10, 5, 3),
            Self::Strict => (3, 10, 3, 2),
            Self::VeryStrict => (2, 5, 2, 1),
        };
        let next = PolicyConfig {
            join_threshold: jt,
            join_interval_secs: ji,
            message_threshold: mt,
            message_interval_secs: mi,
            punishment: punishment.unwrap_or(policy.punishment),
            raid_mode_duration_min: raid_mode_duration_min.unwrap_or(policy.raid_mode_duration_min),
        };
        next.validate()?;
        Ok(next)
    }
}

impl FromStr for ProtectionPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "normal" => Ok(Self::Normal),
            "strict" => Ok(Self::Strict),
            "very_strict" => Ok(Self::VeryStrict),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn parse_number(field: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}
