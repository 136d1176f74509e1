//! telemetry.rs
//!
//! JSONL telemetry sink for evaluation and collection runs.
//!
//! # Environment variables
//!
//! - `SALESGYM_TELEMETRY_MODE`: `"off"` (default) disables telemetry,
//!   `"jsonl"` writes JSONL to `SALESGYM_TELEMETRY_PATH`.
//! - `SALESGYM_TELEMETRY_PATH`: Path to the JSONL file. Required when
//!   mode is `"jsonl"`.
//! - `SALESGYM_TELEMETRY_APPEND`: When `"1"`/`"true"`/`"yes"`, appends to
//!   an existing file instead of truncating it.
//!
//! # Records
//!
//! One JSON object per line. Every record carries `"schema_version"` and a
//! `"kind"` (`"episode"` or `"eval_summary"`); [`TelemetrySink::log_json`]
//! inserts the version when the producer left it out.
//!
//! Telemetry never fails the caller: a sink that cannot open or write its
//! file warns once and switches itself off.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::{json, Value as JsonValue};

use crate::rl::runner::{EpisodeSummary, EvalSummary};

pub const ENV_TELEMETRY_MODE: &str = "SALESGYM_TELEMETRY_MODE";
pub const ENV_TELEMETRY_PATH: &str = "SALESGYM_TELEMETRY_PATH";
pub const ENV_TELEMETRY_APPEND: &str = "SALESGYM_TELEMETRY_APPEND";

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Insert `schema_version` into an object record if it is missing.
///
/// Non-object values are left alone.
pub fn ensure_schema_version(record: &mut JsonValue) {
    if let JsonValue::Object(map) = record {
        map.entry("schema_version")
            .or_insert_with(|| JsonValue::Number(SCHEMA_VERSION.into()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryMode {
    #[default]
    Off,
    Jsonl,
}

impl TelemetryMode {
    /// Unknown values are treated as Off.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => TelemetryMode::Jsonl,
            _ => TelemetryMode::Off,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = lookup(ENV_TELEMETRY_MODE)
            .map(|s| TelemetryMode::parse(&s))
            .unwrap_or_default();
        let path = match mode {
            TelemetryMode::Jsonl => lookup(ENV_TELEMETRY_PATH).map(PathBuf::from),
            TelemetryMode::Off => None,
        };
        let append = lookup(ENV_TELEMETRY_APPEND)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { mode, path, append }
    }

    /// JSONL output to `path`, truncating.
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }
}

/// A JSONL telemetry sink.
///
/// The file is opened lazily on the first record.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        Self {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
        }
    }

    pub fn disabled() -> Self {
        Self::from_config(TelemetryConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    fn disable(&mut self, reason: &str) {
        tracing::warn!(path = ?self.path, reason, "telemetry disabled");
        self.mode = TelemetryMode::Off;
        self.writer = None;
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }
        if self.writer.is_none() {
            let Some(path) = self.path.clone() else {
                self.disable("jsonl mode without a path");
                return None;
            };
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let mut options = OpenOptions::new();
            options.create(true);
            if self.append {
                options.append(true);
            } else {
                options.write(true).truncate(true);
            }
            match options.open(&path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(e) => {
                    self.disable(&e.to_string());
                    return None;
                }
            }
        }
        self.writer.as_mut()
    }

    /// Write one record as a line.
    pub fn log_json(&mut self, value: &JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }
        let mut record = value.clone();
        ensure_schema_version(&mut record);
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let result = serde_json::to_writer(&mut *writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = result {
            self.disable(&e.to_string());
        }
    }

    pub fn log_episode(&mut self, episode: &EpisodeSummary) {
        if self.is_enabled() {
            self.log_json(&episode_record(episode));
        }
    }

    pub fn log_eval_summary(&mut self, summary: &EvalSummary) {
        if self.is_enabled() {
            self.log_json(&eval_record(summary));
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

pub fn episode_record(episode: &EpisodeSummary) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "episode",
        "episode_id": episode.episode_id,
        "seed": episode.seed,
        "persona_id": episode.persona_id,
        "outcome": episode.outcome.as_str(),
        "turns": episode.turns,
        "total_reward": episode.total_reward,
        "final_readiness": episode.final_readiness,
        "actions": episode.actions,
    })
}

pub fn eval_record(summary: &EvalSummary) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "eval_summary",
        "config_name": summary.config_name,
        "config_fingerprint": summary.config_fingerprint,
        "policy_version": summary.policy_version,
        "base_seed": summary.base_seed,
        "episodes": summary.episodes,
        "success_rate": summary.success_rate,
        "timeout_rate": summary.timeout_rate,
        "mean_turns": summary.mean_turns,
        "mean_reward": summary.mean_reward,
        "action_counts": summary.action_counts,
    })
}
