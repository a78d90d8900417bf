// Batch orchestration: fetch the store, pull ShinyBoard data for every
// requested player, merge, then write a dry-run file or push the result.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, RunMode, UsernameMapping};
use crate::error::{SyncError, SyncResult};
use crate::merge::{merge_player_with_stats, MergeFields, MergeStats};
use crate::model::PlayerStore;
use crate::prompt::prompt_credentials;
use crate::shinyboard::{FetchOutcome, ShinyBoardClient};
use crate::store::{Credentials, StoreClient};

/// A requested player resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlayer {
    /// Name as requested (CLI list or store key).
    pub identity: String,
    /// Actual key in the store.
    pub store_key: String,
    /// Username used on ShinyBoard.
    pub lookup_name: String,
}

/// ShinyBoard data gathered for one resolved player.
#[derive(Debug)]
pub struct FetchedPlayer {
    pub player: ResolvedPlayer,
    pub outcome: FetchOutcome,
}

/// Result of processing one player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    pub identity: String,
    pub store_key: String,
    pub lookup_name: String,
    pub fetched: usize,
    pub pages: usize,
    pub fetch_error: Option<String>,
    pub stats: MergeStats,
}

/// A requested player that was not processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlayer {
    pub identity: String,
    pub reason: String,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub processed: Vec<PlayerReport>,
    pub skipped: Vec<SkippedPlayer>,
    /// Dry-run file, when one was written.
    pub output: Option<PathBuf>,
    pub pushed: bool,
}

impl RunReport {
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn log_summary(&self) {
        tracing::info!("Summary:");
        tracing::info!("  Users processed: {}", self.processed_count());
        tracing::info!("  Users skipped: {}", self.skipped_count());
        for skipped in &self.skipped {
            tracing::info!("    {} ({})", skipped.identity, skipped.reason);
        }
    }
}

/// Run a full merge as configured.
pub async fn run(config: &Config) -> SyncResult<RunReport> {
    let store = StoreClient::new(&config.store_url, config.timeout)?;
    let board = ShinyBoardClient::new(&config.shinyboard_url, config.timeout)
        .map_err(|e| SyncError::Config(e.to_string()))?;

    tracing::info!("Starting shiny data merge");
    tracing::info!("Fetching shiny database...");
    let snapshot = store.fetch_database().await.map_err(|e| {
        tracing::error!("Could not fetch the shiny database: {e}");
        e
    })?;
    let fingerprint = snapshot.fingerprint()?;
    tracing::info!("Database loaded ({} users)", snapshot.len());

    let identities: Vec<String> = if config.users.is_empty() {
        let all: Vec<String> = snapshot.identities().map(str::to_string).collect();
        tracing::info!("Using all {} users from the database", all.len());
        all
    } else {
        tracing::info!("Processing configured users: {}", config.users.join(", "));
        config.users.clone()
    };
    tracing::info!("Fields to merge: {}", config.fields.mergeable().join(", "));
    match config.mode {
        RunMode::DryRun => tracing::warn!("Mode: TEST (output to file)"),
        RunMode::Update => tracing::warn!("Mode: UPDATE (real database)"),
    }

    let (resolved, skipped) = resolve_players(&snapshot, &identities, &config.mapping);
    for s in &skipped {
        tracing::warn!("Skipping '{}': {}", s.identity, s.reason);
    }

    tracing::info!("Fetching ShinyBoard data for {} users...", resolved.len());
    let fetched = fetch_players(&board, resolved).await;

    tracing::info!("Merging data...");
    let (merged, mut report) = merge_store(&snapshot, fetched, &config.fields, config.recount);
    report.skipped = skipped;

    match config.mode {
        RunMode::DryRun => {
            let keys: Vec<&str> = report.processed.iter().map(|p| p.store_key.as_str()).collect();
            let subset = merged.subset(keys);
            let path = write_json(&subset, &config.output_path).await?;
            tracing::info!("Test mode complete, review {}", path.display());
            tracing::info!("Run again without --test to push the merge");
            report.output = Some(path);
        }
        RunMode::Update => {
            push(&store, &snapshot, &fingerprint, &merged, &report, config).await?;
            report.pushed = true;
        }
    }

    report.log_summary();
    Ok(report)
}

/// Resolve requested identities to store keys and ShinyBoard names.
///
/// Unknown identities, and repeats of a store key already resolved, are
/// returned as skips.
pub fn resolve_players(
    snapshot: &PlayerStore,
    identities: &[String],
    mapping: &UsernameMapping,
) -> (Vec<ResolvedPlayer>, Vec<SkippedPlayer>) {
    let mut resolved: Vec<ResolvedPlayer> = Vec::new();
    let mut skipped = Vec::new();

    for identity in identities {
        let Some(store_key) = snapshot.resolve_key(identity) else {
            skipped.push(SkippedPlayer {
                identity: identity.clone(),
                reason: "not found in database".to_string(),
            });
            continue;
        };
        if resolved.iter().any(|r| r.store_key == store_key) {
            skipped.push(SkippedPlayer {
                identity: identity.clone(),
                reason: format!("duplicate of '{store_key}'"),
            });
            continue;
        }
        resolved.push(ResolvedPlayer {
            identity: identity.clone(),
            store_key: store_key.to_string(),
            lookup_name: mapping.lookup_name(identity).to_string(),
        });
    }

    (resolved, skipped)
}

/// Fetch ShinyBoard data for every player concurrently. Each player's pages
/// are still fetched in sequence.
pub async fn fetch_players(
    board: &ShinyBoardClient,
    players: Vec<ResolvedPlayer>,
) -> Vec<FetchedPlayer> {
    let fetches = players.into_iter().map(|player| async move {
        let outcome = board.fetch_all(&player.lookup_name).await;
        let mapped = if player.lookup_name != player.identity {
            format!(" (mapped from \"{}\")", player.identity)
        } else {
            String::new()
        };
        match &outcome.error {
            None => tracing::info!(
                "  {}{mapped}: {} shinies",
                player.lookup_name,
                outcome.records.len()
            ),
            Some(e) if outcome.pages == 0 => {
                tracing::error!("  {}{mapped}: fetch failed: {e}", player.lookup_name)
            }
            Some(e) => tracing::warn!(
                "  {}{mapped}: {} shinies, truncated after {} pages: {e}",
                player.lookup_name,
                outcome.records.len(),
                outcome.pages
            ),
        }
        FetchedPlayer { player, outcome }
    });
    join_all(fetches).await
}

/// Merge fetched data into a copy of the snapshot. Pure apart from logging.
pub fn merge_store(
    snapshot: &PlayerStore,
    fetched: Vec<FetchedPlayer>,
    fields: &MergeFields,
    recount: bool,
) -> (PlayerStore, RunReport) {
    let mut merged = snapshot.clone();
    let mut report = RunReport::default();

    for FetchedPlayer { player, outcome } in fetched {
        let (updated, stats) =
            merge_player_with_stats(snapshot.get(&player.store_key), &outcome.records, fields);

        if let Some(mut record) = updated {
            if recount {
                let before = record.shiny_count().cloned().unwrap_or(Value::Null);
                match record.recalc_shiny_count() {
                    Some(after) if before.as_u64() != Some(after) => {
                        tracing::info!("  {}: shiny_count {before} -> {after}", player.store_key)
                    }
                    Some(_) => {}
                    None => tracing::warn!(
                        "  {}: record is not an object, shiny_count left alone",
                        player.store_key
                    ),
                }
            }
            merged.insert(player.store_key.clone(), record);
        }

        tracing::info!(
            "  {} -> {}: processed {} shinies with {} API entries ({} matched)",
            player.identity,
            player.store_key,
            stats.shinies,
            outcome.records.len(),
            stats.matched
        );
        tracing::debug!(
            "  {}: {} unmatched local, {} unused and {} unnamed API entries",
            player.store_key,
            stats.unmatched_local,
            stats.unused_secondary,
            stats.discarded_secondary
        );

        report.processed.push(PlayerReport {
            identity: player.identity,
            store_key: player.store_key,
            lookup_name: player.lookup_name,
            fetched: outcome.records.len(),
            pages: outcome.pages,
            fetch_error: outcome.error.map(|e| e.to_string()),
            stats,
        });
    }

    (merged, report)
}

async fn push(
    store: &StoreClient,
    snapshot: &PlayerStore,
    fingerprint: &str,
    merged: &PlayerStore,
    report: &RunReport,
    config: &Config,
) -> SyncResult<()> {
    let names: Vec<&str> = report.processed.iter().map(|p| p.store_key.as_str()).collect();
    tracing::warn!("NOTICE: merging configured users and pushing to the shiny database");
    tracing::info!("Processing users: {}", names.join(", "));
    tracing::info!(
        "All other {} users remain unchanged",
        snapshot.len().saturating_sub(names.len())
    );

    let credentials = match config.credentials() {
        Some(credentials) => credentials,
        None => ask_credentials(config.admin_username.clone()).await?,
    };

    if !config.grace_period.is_zero() {
        tracing::warn!(
            "Pushing in {} seconds, press Ctrl+C now to cancel",
            config.grace_period.as_secs()
        );
        tokio::time::sleep(config.grace_period).await;
    }

    if config.force {
        tracing::warn!("--force given, not checking for concurrent changes");
    } else {
        let current = match store.fetch_database().await {
            Ok(current) => current.fingerprint()?,
            Err(e) => {
                save_unsent(merged, &config.output_path).await;
                return Err(e.into());
            }
        };
        if current != fingerprint {
            tracing::error!("The shiny database changed while this merge was running");
            save_unsent(merged, &config.output_path).await;
            return Err(SyncError::StoreChanged {
                expected: fingerprint.to_string(),
                actual: current,
            });
        }
    }

    let action = format!(
        "Automated merge from merge script ({} users, {})",
        names.len(),
        chrono::Utc::now().to_rfc3339()
    );
    tracing::info!("Pushing merged data...");
    if let Err(e) = store.update_database(merged, &credentials, &action).await {
        tracing::error!("Error updating the shiny database: {e}");
        save_unsent(merged, &config.output_path).await;
        return Err(e.into());
    }
    tracing::info!("Push complete, database updated");
    Ok(())
}

async fn ask_credentials(known_username: Option<String>) -> SyncResult<Credentials> {
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        prompt_credentials(stdin.lock(), std::io::stderr(), known_username.as_deref())
    })
    .await
    .map_err(|e| SyncError::Prompt(e.to_string()))?
    .map_err(|e| SyncError::Prompt(e.to_string()))
}

/// Path a merged store is saved to when it could not be pushed.
pub fn unsent_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("unsent.json")
}

async fn save_unsent(merged: &PlayerStore, output_path: &Path) {
    let path = unsent_path(output_path);
    match write_json(merged, &path).await {
        Ok(path) => tracing::warn!("Merged database kept at {}", path.display()),
        Err(e) => tracing::error!("Could not save the merged database: {e}"),
    }
}

/// Write pretty-printed JSON, returning the absolute path written.
async fn write_json(store: &PlayerStore, path: &Path) -> SyncResult<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let text = serde_json::to_string_pretty(store)?;
    tokio::fs::write(&path, text).await?;
    tracing::info!("Data written to {}", path.display());
    Ok(path)
}
