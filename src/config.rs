// Run configuration, resolved from CLI flags, environment variables and
// built-in defaults (in that order of precedence).

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use indexmap::IndexMap;

use crate::error::{SyncError, SyncResult};
use crate::merge::{MergeFields, ALL_MERGEABLE_FIELDS, DEFAULT_MERGE_FIELDS};
use crate::model::normalize_name;
use crate::store::Credentials;

pub const DEFAULT_STORE_URL: &str = "https://adminpage.hypersmmo.workers.dev/admin";
pub const DEFAULT_SHINYBOARD_URL: &str = "https://shinyboard.net";
pub const DEFAULT_OUTPUT_PATH: &str = "./merged_shiny_data.json";
pub const DEFAULT_GRACE_SECONDS: u64 = 5;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub const ENV_STORE_URL: &str = "SHINY_SYNC_STORE_URL";
pub const ENV_SHINYBOARD_URL: &str = "SHINY_SYNC_SHINYBOARD_URL";
pub const ENV_OUTPUT: &str = "SHINY_SYNC_OUTPUT";
pub const ENV_MAPPING: &str = "SHINY_SYNC_MAPPING";
pub const ENV_GRACE_SECONDS: &str = "SHINY_SYNC_GRACE_SECONDS";
pub const ENV_TIMEOUT_SECONDS: &str = "SHINY_SYNC_TIMEOUT_SECONDS";
pub const ENV_ADMIN_USERNAME: &str = "SHINY_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "SHINY_ADMIN_PASSWORD";

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(name = "shiny-sync", version)]
#[command(about = "Merge ShinyBoard catch data into the shiny database")]
pub struct CliArgs {
    /// Write merged players to a file instead of pushing to the store
    #[arg(long = "test", visible_alias = "dry-run", conflicts_with = "update")]
    pub test: bool,

    /// Push the merged database to the store (default)
    #[arg(long)]
    pub update: bool,

    /// Comma-separated players to process (default: every player in the store)
    #[arg(long, value_name = "NAME,NAME")]
    pub users: Option<String>,

    /// Comma-separated fields to merge
    #[arg(long, value_name = "FIELD,FIELD")]
    pub fields: Option<String>,

    /// Dry-run output file
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// JSON file mapping store names to ShinyBoard usernames
    #[arg(long, value_name = "FILE")]
    pub mapping: Option<PathBuf>,

    /// Admin root of the database Worker
    #[arg(long, value_name = "URL")]
    pub store_url: Option<String>,

    /// ShinyBoard base URL
    #[arg(long, value_name = "URL")]
    pub shinyboard_url: Option<String>,

    /// Seconds to wait before pushing, as a chance to cancel
    #[arg(long, value_name = "SECS")]
    pub grace_seconds: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_seconds: Option<u64>,

    /// Admin username for the push (password comes from the environment or a prompt)
    #[arg(long)]
    pub username: Option<String>,

    /// Recompute shiny_count for processed players
    #[arg(long)]
    pub recount: bool,

    /// Push even if the store changed since it was fetched
    #[arg(long)]
    pub force: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Write processed players to a file.
    DryRun,
    /// Push the whole merged store.
    Update,
}

/// Store name -> ShinyBoard username overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsernameMapping {
    entries: IndexMap<String, String>,
}

impl UsernameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, store_name: impl Into<String>, board_name: impl Into<String>) {
        self.entries.insert(store_name.into(), board_name.into());
    }

    /// Parse a JSON object of `"StoreName": "ShinyBoardName"` pairs.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let entries: IndexMap<String, String> = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read mapping file {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// ShinyBoard username for a player; the player's own name when unmapped.
    pub fn lookup_name<'a>(&'a self, identity: &'a str) -> &'a str {
        if let Some(name) = self.entries.get(identity) {
            return name;
        }
        let wanted = normalize_name(identity);
        self.entries
            .iter()
            .find(|(key, _)| normalize_name(key) == wanted)
            .map(|(_, name)| name.as_str())
            .unwrap_or(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolved settings for one run.
#[derive(Clone)]
pub struct Config {
    pub mode: RunMode,
    /// Explicit players; empty means every player in the store.
    pub users: Vec<String>,
    pub fields: MergeFields,
    pub store_url: String,
    pub shinyboard_url: String,
    pub output_path: PathBuf,
    pub mapping: UsernameMapping,
    pub grace_period: Duration,
    pub timeout: Duration,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub recount: bool,
    pub force: bool,
}

impl Config {
    /// Build the run configuration from parsed flags, falling back to
    /// environment variables read through `env`, then to defaults.
    pub fn resolve<F>(args: &CliArgs, env: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = if args.test {
            RunMode::DryRun
        } else {
            RunMode::Update
        };

        let users = args.users.as_deref().map(parse_list).unwrap_or_default();

        let field_list = args
            .fields
            .as_deref()
            .map(parse_list)
            .filter(|list| !list.is_empty());
        let fields = match field_list {
            Some(list) => MergeFields::new(list, ALL_MERGEABLE_FIELDS.iter().copied()),
            None => MergeFields::new(
                DEFAULT_MERGE_FIELDS.iter().copied(),
                ALL_MERGEABLE_FIELDS.iter().copied(),
            ),
        };

        let store_url = args
            .store_url
            .clone()
            .or_else(|| env(ENV_STORE_URL))
            .unwrap_or_else(|| DEFAULT_STORE_URL.to_string());

        let shinyboard_url = args
            .shinyboard_url
            .clone()
            .or_else(|| env(ENV_SHINYBOARD_URL))
            .unwrap_or_else(|| DEFAULT_SHINYBOARD_URL.to_string());

        let output_path = args
            .output
            .clone()
            .or_else(|| env(ENV_OUTPUT).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));

        let mapping = match args.mapping.clone().or_else(|| env(ENV_MAPPING).map(PathBuf::from)) {
            Some(path) => UsernameMapping::load(&path)?,
            None => UsernameMapping::new(),
        };

        let grace_seconds = match args.grace_seconds {
            Some(secs) => secs,
            None => parse_env_u64(&env, ENV_GRACE_SECONDS)?.unwrap_or(DEFAULT_GRACE_SECONDS),
        };

        let timeout_seconds = match args.timeout_seconds {
            Some(secs) => secs,
            None => parse_env_u64(&env, ENV_TIMEOUT_SECONDS)?.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        };

        let admin_username = args.username.clone().or_else(|| env(ENV_ADMIN_USERNAME));
        let admin_password = env(ENV_ADMIN_PASSWORD);

        Ok(Config {
            mode,
            users,
            fields,
            store_url,
            shinyboard_url,
            output_path,
            mapping,
            grace_period: Duration::from_secs(grace_seconds),
            timeout: Duration::from_secs(timeout_seconds),
            admin_username,
            admin_password,
            recount: args.recount,
            force: args.force,
        })
    }

    /// Credentials known without prompting.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.admin_username, &self.admin_password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some(Credentials::new(user, pass)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("users", &self.users)
            .field("fields", &self.fields)
            .field("store_url", &self.store_url)
            .field("shinyboard_url", &self.shinyboard_url)
            .field("output_path", &self.output_path)
            .field("mapping", &self.mapping)
            .field("grace_period", &self.grace_period)
            .field("timeout", &self.timeout)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "<redacted>"))
            .field("recount", &self.recount)
            .field("force", &self.force)
            .finish()
    }
}

/// Split a comma-separated flag value, trimming entries and dropping blanks.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env_u64<F>(env: &F, key: &str) -> SyncResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::Config(format!("{key} must be a whole number of seconds, got {raw:?}"))),
        None => Ok(None),
    }
}
