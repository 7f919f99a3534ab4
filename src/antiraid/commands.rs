// src/antiraid/commands.rs
//! `/antiraid` – cienka warstwa konfiguracji: status, progi, presety, raid mode,
//! allow-lista i zakazane słowa. Cała logika siedzi w [`AntiRaid`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandOptionType, Context, CreateCommand,
    CreateCommandOption, EditInteractionResponse, GuildId, Interaction, Permissions,
};

use super::{AntiRaid, RaidToggle, policy::{ProtectionPreset, PunishmentKind, SETTING_NAMES}};
use crate::AppContext;

const FOOTER: &str = "Tigris Security System™ • RaidGuard";

/// Sparsowana subkomenda `/antiraid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AntiRaidCommand {
    Status,
    Set { setting: String, value: String },
    Preset { level: String, punishment: Option<String>, minutes: Option<i64> },
    RaidOn { minutes: Option<i64> },
    RaidOff,
    WhitelistAdd(u64),
    WhitelistRemove(u64),
    WhitelistList,
    WordsAdd(String),
    WordsRemove(String),
    WordsList,
}

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let setting = SETTING_NAMES.iter().fold(
        CreateCommandOption::new(CommandOptionType::String, "setting", "Setting to change").required(true),
        |opt, name| opt.add_string_choice(*name, *name),
    );
    let punishment = || {
        CreateCommandOption::new(CommandOptionType::String, "punishment", "Punishment")
            .add_string_choice("kick", "kick")
            .add_string_choice("ban", "ban")
            .add_string_choice("mute", "mute")
    };
    let minutes = || {
        CreateCommandOption::new(CommandOptionType::Integer, "minutes", "Raid mode duration (minutes)")
            .min_int_value(1)
            .max_int_value(super::policy::MAX_RAID_MODE_MINUTES)
    };
    let user = |desc: &str| {
        CreateCommandOption::new(CommandOptionType::User, "user", desc.to_string()).required(true)
    };
    let word = |desc: &str| {
        CreateCommandOption::new(CommandOptionType::String, "word", desc.to_string()).required(true)
    };

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("antiraid")
                .description("Anti-raid protection settings")
                .default_member_permissions(Permissions::ADMINISTRATOR)
                .add_option(CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "status",
                    "Show thresholds and raid mode state",
                ))
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommand, "set", "Change one setting")
                        .add_sub_option(setting)
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::String, "value", "New value")
                                .required(true),
                        ),
                )
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommand, "preset", "Apply a protection level")
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::String, "level", "Protection level")
                                .required(true)
                                .add_string_choice("normal", "normal")
                                .add_string_choice("strict", "strict")
                                .add_string_choice("very_strict", "very_strict"),
                        )
                        .add_sub_option(punishment())
                        .add_sub_option(minutes()),
                )
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommand, "raidmode", "Toggle raid mode manually")
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::String, "state", "on / off")
                                .required(true)
                                .add_string_choice("on", "on")
                                .add_string_choice("off", "off"),
                        )
                        .add_sub_option(minutes()),
                )
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommandGroup, "whitelist", "Members exempt from detection")
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Exempt a member")
                                .add_sub_option(user("Member to exempt")),
                        )
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Remove an exemption")
                                .add_sub_option(user("Member to remove")),
                        )
                        .add_sub_option(CreateCommandOption::new(
                            CommandOptionType::SubCommand,
                            "list",
                            "List exempt members",
                        )),
                )
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommandGroup, "words", "Banned words")
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Ban a word")
                                .add_sub_option(word("Word or phrase")),
                        )
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Unban a word")
                                .add_sub_option(word("Word or phrase")),
                        )
                        .add_sub_option(CreateCommandOption::new(
                            CommandOptionType::SubCommand,
                            "list",
                            "List banned words",
                        )),
                ),
        )
        .await?;
    Ok(())
}

pub const GUILD_ONLY: &str = "❌ This command only works inside a server";

/// Odpowiedź na odroczoną interakcję – zawsze jakiś tekst, żeby nie wisiało "myśli…".
pub async fn reply_for(
    engine: &AntiRaid,
    guild_id: Option<u64>,
    user_id: u64,
    cmd: Option<&AntiRaidCommand>,
    now: DateTime<Utc>,
) -> String {
    let Some(guild_id) = guild_id else {
        return GUILD_ONLY.to_string();
    };
    match cmd {
        Some(cmd) => handle_subcommand(engine, guild_id, user_id, cmd, now).await,
        None => "unknown subcommand".to_string(),
    }
}

pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: Interaction) {
    let Some(cmd) = interaction.command() else {
        return;
    };
    if cmd.data.name != "antiraid" {
        return;
    }
    if let Err(err) = cmd.defer_ephemeral(&ctx.http).await {
        tracing::warn!(error=?err, "failed to defer antiraid interaction");
    }

    let parsed = cmd.data.options.first().and_then(parse_subcommand);
    let guild_id = cmd.guild_id.map(|g| g.get());
    let content = reply_for(&app.engine, guild_id, cmd.user.id.get(), parsed.as_ref(), Utc::now()).await;

    if let Err(err) = cmd
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await
    {
        tracing::warn!(error=?err, "failed to edit antiraid response");
    }
}

pub fn parse_subcommand(sub: &CommandDataOption) -> Option<AntiRaidCommand> {
    match (sub.name.as_str(), &sub.value) {
        ("status", _) => Some(AntiRaidCommand::Status),
        ("set", CommandDataOptionValue::SubCommand(opts)) => Some(AntiRaidCommand::Set {
            setting: opt_str(opts, "setting")?,
            value: opt_str(opts, "value")?,
        }),
        ("preset", CommandDataOptionValue::SubCommand(opts)) => Some(AntiRaidCommand::Preset {
            level: opt_str(opts, "level")?,
            punishment: opt_str(opts, "punishment"),
            minutes: opt_int(opts, "minutes"),
        }),
        ("raidmode", CommandDataOptionValue::SubCommand(opts)) => match opt_str(opts, "state")?.as_str() {
            "on" => Some(AntiRaidCommand::RaidOn { minutes: opt_int(opts, "minutes") }),
            "off" => Some(AntiRaidCommand::RaidOff),
            _ => None,
        },
        ("whitelist", CommandDataOptionValue::SubCommandGroup(inner)) => {
            let inner = inner.first()?;
            let CommandDataOptionValue::SubCommand(opts) = &inner.value else {
                return None;
            };
            match inner.name.as_str() {
                "add" => Some(AntiRaidCommand::WhitelistAdd(opt_user(opts, "user")?)),
                "remove" => Some(AntiRaidCommand::WhitelistRemove(opt_user(opts, "user")?)),
                "list" => Some(AntiRaidCommand::WhitelistList),
                _ => None,
            }
        }
        ("words", CommandDataOptionValue::SubCommandGroup(inner)) => {
            let inner = inner.first()?;
            let CommandDataOptionValue::SubCommand(opts) = &inner.value else {
                return None;
            };
            match inner.name.as_str() {
                "add" => Some(AntiRaidCommand::WordsAdd(opt_str(opts, "word")?)),
                "remove" => Some(AntiRaidCommand::WordsRemove(opt_str(opts, "word")?)),
                "list" => Some(AntiRaidCommand::WordsList),
                _ => None,
            }
        }
        _ => None,
    }
}

fn opt_str(opts: &[CommandDataOption], name: &str) -> Option<String> {
    opts.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

fn opt_int(opts: &[CommandDataOption], name: &str) -> Option<i64> {
    opts.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Integer(v) => Some(*v),
        _ => None,
    })
}

fn opt_user(opts: &[CommandDataOption], name: &str) -> Option<u64> {
    opts.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::User(id) => Some(id.get()),
        _ => None,
    })
}

/// Wykonanie subkomendy; zwraca treść odpowiedzi.
pub async fn handle_subcommand(
    engine: &AntiRaid,
    guild_id: u64,
    user_id: u64,
    cmd: &AntiRaidCommand,
    now: DateTime<Utc>,
) -> String {
    match cmd {
        AntiRaidCommand::Status => status_text(engine, guild_id, now).await,
        AntiRaidCommand::Set { setting, value } => match engine.set_setting(guild_id, setting, value).await {
            Ok(_) => format!("✅ `{setting}` set to `{value}`"),
            Err(e) => format!("❌ {e}"),
        },
        AntiRaidCommand::Preset { level, punishment, minutes } => {
            let preset = match level.parse::<ProtectionPreset>() {
                Ok(p) => p,
                Err(e) => return format!("❌ {e}"),
            };
            let punishment = match punishment.as_deref().map(str::parse::<PunishmentKind>).transpose() {
                Ok(p) => p,
                Err(e) => return format!("❌ {e}"),
            };
            let minutes = minutes.map(|m| m.max(0) as u64);
            match engine.apply_preset(guild_id, preset, punishment, minutes).await {
                Ok(p) => format!(
                    "✅ Preset `{}` applied: joins {}/{}s, messages {}/{}s, punishment `{}`",
                    preset.as_str(),
                    p.join_threshold,
                    p.join_interval_secs,
                    p.message_threshold,
                    p.message_interval_secs,
                    p.punishment
                ),
                Err(e) => format!("❌ {e}"),
            }
        }
        AntiRaidCommand::RaidOn { minutes } => {
            tracing::info!(guild_id, user_id, ?minutes, "raid mode enabled by command");
            match engine.enable_raid_mode(guild_id, minutes.map(|m| m.max(0) as u64), now).await {
                Ok(RaidToggle::Activated(t)) => {
                    format!("🛡️ Raid mode enabled until <t:{}:T>", t.expires_at.timestamp())
                }
                Ok(RaidToggle::AlreadyActive { expires_at }) => match expires_at {
                    Some(exp) => format!("ℹ️ Raid mode is already active until <t:{}:T>", exp.timestamp()),
                    None => "ℹ️ Raid mode is already active".to_string(),
                },
                Err(e) => format!("❌ {e}"),
            }
        }
        AntiRaidCommand::RaidOff => {
            tracing::info!(guild_id, user_id, "raid mode disabled by command");
            if engine.disable_raid_mode(guild_id, now).await {
                "✅ Raid mode disabled".to_string()
            } else {
                "ℹ️ Raid mode was not active".to_string()
            }
        }
        AntiRaidCommand::WhitelistAdd(actor) => match engine.allow(guild_id, *actor, Some(user_id)).await {
            Ok(true) => format!("✅ <@{actor}> added to the whitelist"),
            Ok(false) => format!("ℹ️ <@{actor}> is already whitelisted"),
            Err(e) => format!("❌ whitelist update failed: {e}"),
        },
        AntiRaidCommand::WhitelistRemove(actor) => match engine.disallow(guild_id, *actor).await {
            Ok(true) => format!("✅ <@{actor}> removed from the whitelist"),
            Ok(false) => format!("ℹ️ <@{actor}> was not whitelisted"),
            Err(e) => format!("❌ whitelist update failed: {e}"),
        },
        AntiRaidCommand::WhitelistList => {
            let ids = engine.allow_list(guild_id).await;
            if ids.is_empty() {
                "Whitelist is empty".to_string()
            } else {
                ids.iter().map(|id| format!("• <@{id}>")).collect::<Vec<_>>().join("\n")
            }
        }
        AntiRaidCommand::WordsAdd(word) => match engine.add_banned_word(guild_id, word).await {
            Ok(true) => format!("✅ `{}` added to banned words", word.trim()),
            Ok(false) => format!("ℹ️ `{}` is already banned", word.trim()),
            Err(e) => format!("❌ {e}"),
        },
        AntiRaidCommand::WordsRemove(word) => match engine.remove_banned_word(guild_id, word).await {
            Ok(true) => format!("✅ `{}` removed from banned words", word.trim()),
            Ok(false) => format!("ℹ️ `{}` was not on the list", word.trim()),
            Err(e) => format!("❌ {e}"),
        },
        AntiRaidCommand::WordsList => {
            let words = engine.banned_words(guild_id).await;
            if words.is_empty() {
                "No guild banned words".to_string()
            } else {
                words.iter().map(|w| format!("• `{w}`")).collect::<Vec<_>>().join("\n")
            }
        }
    }
}

async fn status_text(engine: &AntiRaid, guild_id: u64, now: DateTime<Utc>) -> String {
    let s = engine.status(guild_id, now).await;
    let raid = match (s.raid_active, s.raid_remaining) {
        (true, Some(left)) => format!("🔴 active ({} min left)", (left.num_seconds() + 59) / 60),
        (true, None) => "🔴 active".to_string(),
        _ => "🟢 inactive".to_string(),
    };
    format!(
        "**🛡️ Anti-Raid status**\n\
         Join limit: {} joins / {} s\n\
         Message limit: {} messages / {} s\n\
         Punishment: `{}`\n\
         Raid mode duration: {} min\n\
         Raid mode: {}\n\
         Whitelisted: {} • Banned words: {}\n\
         _{}_",
        s.policy.join_threshold,
        s.policy.join_interval_secs,
        s.policy.message_threshold,
        s.policy.message_interval_secs,
        s.policy.punishment,
        s.policy.raid_mode_duration_min,
        raid,
        s.allow_listed,
        s.banned_words,
        FOOTER
    )
}
