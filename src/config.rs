use std::env;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use crate::dates::DEFAULT_INPUT_FORMAT;

pub const DEFAULT_FAKE_DOMAINS: &[&str] = &[
    "@guest.booking.com",
    "@expediapartnercentral.com",
    "@noemail.com",
    "@airbnb.com",
];
pub const DEFAULT_HOSTEL: &str = "Aguere";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(value) => parse_list(&value),
        Err(_) => default.iter().map(|item| item.to_string()).collect(),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which fields a row must carry before it is worth storing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
pub enum AcceptancePolicy {
    /// Any one of first name, last name or email.
    #[default]
    AnyIdentifier,
    /// Both first name and email.
    NameAndEmail,
}

/// Settings for turning spreadsheet rows into stored guests.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub date_format: String,
    pub fake_domains: Vec<String>,
    pub policy: AcceptancePolicy,
    /// When set, rows with an invalid or fake email are not stored.
    pub filter_flagged: bool,
    pub hostel: String,
    pub consent: bool,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            date_format: env_string("GUEST_DATE_FORMAT", DEFAULT_INPUT_FORMAT),
            fake_domains: env_list("GUEST_FAKE_DOMAINS", DEFAULT_FAKE_DOMAINS),
            policy: AcceptancePolicy::default(),
            filter_flagged: false,
            hostel: env_string("GUEST_HOSTEL", DEFAULT_HOSTEL),
            consent: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_INPUT_FORMAT.to_string(),
            fake_domains: DEFAULT_FAKE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            policy: AcceptancePolicy::default(),
            filter_flagged: false,
            hostel: DEFAULT_HOSTEL.to_string(),
            consent: true,
        }
    }
}

/// Settings for the duplicate cleanup. Defaults to a dry run with backups on.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub batch_size: usize,
    pub dry_run: bool,
    pub backup: bool,
}

impl CleanupConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: env_usize("GUEST_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            ..Self::default()
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: true,
            backup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub filename_prefix: String,
    pub fake_domains: Vec<String>,
}

impl ExportConfig {
    pub fn from_env() -> Self {
        Self {
            output_dir: PathBuf::from(env_string("GUEST_EXPORT_DIR", "exports")),
            filename_prefix: env_string("GUEST_EXPORT_PREFIX", "brevo_export"),
            fake_domains: env_list("GUEST_FAKE_DOMAINS", DEFAULT_FAKE_DOMAINS),
        }
    }
}
