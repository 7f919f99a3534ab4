// src/error.rs

use thiserror::Error;

/// Błędy akcji moderacyjnych zwracane przez platformę (kick/ban/rola/wiadomości).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModerationError {
    /// Platforma odrzuciła akcję (brak uprawnień / hierarchia ról).
    #[error("insufficient permission")]
    PermissionDenied,
    /// Rola/kanał/wiadomość zniknęły między sprawdzeniem a użyciem.
    #[error("target not found")]
    NotFound,
    #[error("platform error: {0}")]
    Platform(String),
}

impl ModerationError {
    /// NotFound traktujemy tak samo jak brak uprawnień: best-effort, połknij + powiadom.
    pub fn is_permission_like(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::NotFound)
    }
}

/// Odrzucenia na granicy konfiguracji – nigdy nie docierają do detektorów.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("unknown punishment `{0}` (expected kick, ban or mute)")]
    UnknownPunishment(String),
    #[error("unknown setting `{0}`")]
    UnknownSetting(String),
    #[error("unknown preset `{0}` (expected normal, strict or very_strict)")]
    UnknownPreset(String),
    #[error("`{value}` is not a valid number for {field}")]
    InvalidNumber { field: String, value: String },
}
