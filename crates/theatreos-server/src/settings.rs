// SPDX-License-Identifier: Apache-2.0
//! The environment-variable contract (spec §6), loaded once at startup into
//! one typed [`Settings`] struct via the `config` crate's environment
//! source.

use serde::Deserialize;

/// TheatreOS's full configuration surface, sourced from environment
/// variables (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Postgres connection string. Required.
    pub database_url: String,
    /// HMAC/JWT signing secret. Required; carried as an opaque string since
    /// authentication itself is a named external collaborator (spec §1).
    pub jwt_secret: String,
    /// Optional content-generation API key.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// Optional content-generation API key (alternate provider).
    #[serde(default)]
    pub dashscope_api_key: Option<String>,

    /// Width of one scheduler slot, minutes.
    #[serde(default = "default_slot_duration_minutes")]
    pub slot_duration_minutes: u32,
    /// How many slots ahead the scheduler plans.
    #[serde(default = "default_schedule_lookahead_hours")]
    pub schedule_lookahead_hours: u32,
    /// Minutes into the slot a planned gate closes.
    #[serde(default = "default_gate_resolve_minute")]
    pub gate_resolve_minute: u32,
    /// Scene slots filled per `HourPlan`.
    #[serde(default = "default_parallel_scenes")]
    pub default_parallel_scenes: usize,

    /// Session token lifetime, hours.
    #[serde(default = "default_token_expire_hours")]
    pub token_expire_hours: i64,

    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// HTTP bind host.
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// HTTP bind port.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Verbose/debug mode toggle.
    #[serde(default)]
    pub debug: bool,

    /// Theme-pack directory, required to construct a
    /// [`theatreos_themepack::ThemePackRegistry`]; defaults to a `packs/`
    /// directory beside the binary's working directory.
    #[serde(default = "default_packs_dir")]
    pub packs_dir: String,
    /// Default theme-pack id for theatres bound without an explicit pack.
    #[serde(default = "default_pack_id")]
    pub default_pack_id: String,
}

fn default_slot_duration_minutes() -> u32 {
    60
}
fn default_schedule_lookahead_hours() -> u32 {
    3
}
fn default_gate_resolve_minute() -> u32 {
    55
}
fn default_parallel_scenes() -> usize {
    3
}
fn default_token_expire_hours() -> i64 {
    24
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_api_host() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_packs_dir() -> String {
    "packs".to_string()
}
fn default_pack_id() -> String {
    "default".to_string()
}

impl Settings {
    /// Load from the process environment (spec §6; e.g. `DATABASE_URL`,
    /// `SLOT_DURATION_MINUTES`).
    pub fn load() -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// This process's scheduler knobs, for [`theatreos_scheduler::SchedulerConfig`].
    #[must_use]
    pub fn scheduler_config(&self) -> theatreos_scheduler::SchedulerConfig {
        theatreos_scheduler::SchedulerConfig {
            slot_duration_minutes: self.slot_duration_minutes,
            gate_resolve_minute: self.gate_resolve_minute,
            lookahead_hours: self.schedule_lookahead_hours,
            beat_budget: self.default_parallel_scenes,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_reflects_env_knobs() {
        let settings = Settings {
            database_url: "postgres://localhost/test".to_string(),
            jwt_secret: "secret".to_string(),
            openai_api_key: None,
            dashscope_api_key: None,
            slot_duration_minutes: 30,
            schedule_lookahead_hours: 2,
            gate_resolve_minute: 25,
            default_parallel_scenes: 5,
            token_expire_hours: 24,
            log_level: "info".to_string(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            debug: false,
            packs_dir: "packs".to_string(),
            default_pack_id: "default".to_string(),
        };
        let cfg = settings.scheduler_config();
        assert_eq!(cfg.slot_duration_minutes, 30);
        assert_eq!(cfg.beat_budget, 5);
    }
}
