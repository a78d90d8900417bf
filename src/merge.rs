// Merge engine: overlays ShinyBoard fields onto stored shinies.
//
// Records are paired per species in FIFO order: the Nth stored shiny of a
// species (in key order) receives the Nth ShinyBoard record of that species
// (in fetch order). No other attribute takes part in the pairing.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use serde_json::Map;

use crate::model::{shiny_species, PlayerRecord, SecondaryRecord, ShinyRecord};

/// Fields merged when the operator does not pass a field list.
pub const DEFAULT_MERGE_FIELDS: &[&str] = &[
    "ivs",
    "nature",
    "location",
    "encounter_method",
    "date_caught",
    "encounter_count",
    "nickname",
];

/// Every field the merge has ever been allowed to write. Fields in here but
/// not in the current run's list are stripped from stored shinies.
pub const ALL_MERGEABLE_FIELDS: &[&str] = &[
    "ivs",
    "nature",
    "location",
    "encounter_method",
    "date_caught",
    "encounter_count",
    "nickname",
    "variant",
];

/// The field configuration for one merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFields {
    mergeable: Vec<String>,
    all_mergeable: Vec<String>,
}

impl MergeFields {
    pub fn new<I, J, S, T>(mergeable: I, all_mergeable: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            mergeable: mergeable.into_iter().map(Into::into).collect(),
            all_mergeable: all_mergeable.into_iter().map(Into::into).collect(),
        }
    }

    /// Use `mergeable` against the built-in superset.
    pub fn with_fields<I, S>(mergeable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(mergeable, ALL_MERGEABLE_FIELDS.iter().copied())
    }

    pub fn mergeable(&self) -> &[String] {
        &self.mergeable
    }

    pub fn all_mergeable(&self) -> &[String] {
        &self.all_mergeable
    }

    /// Fields in the superset that this run no longer merges.
    pub fn fields_to_strip(&self) -> Vec<&str> {
        self.all_mergeable
            .iter()
            .filter(|f| !self.mergeable.contains(*f))
            .map(String::as_str)
            .collect()
    }
}

impl Default for MergeFields {
    fn default() -> Self {
        Self::new(
            DEFAULT_MERGE_FIELDS.iter().copied(),
            ALL_MERGEABLE_FIELDS.iter().copied(),
        )
    }
}

/// Per-species FIFO queues of ShinyBoard records.
#[derive(Debug, Default)]
pub struct SpeciesBuckets<'a> {
    buckets: HashMap<String, VecDeque<&'a SecondaryRecord>>,
    discarded: usize,
}

impl<'a> SpeciesBuckets<'a> {
    /// Group records by species, keeping arrival order inside each bucket.
    /// Records without a species name are dropped.
    pub fn from_records(records: &'a [SecondaryRecord]) -> Self {
        let mut buckets: HashMap<String, VecDeque<&'a SecondaryRecord>> = HashMap::new();
        let mut discarded = 0;
        for record in records {
            let species = crate::model::normalize_name(&record.pokemon_name);
            if species.is_empty() {
                discarded += 1;
                continue;
            }
            buckets.entry(species).or_default().push_back(record);
        }
        Self { buckets, discarded }
    }

    /// Take the oldest unconsumed record for a normalized species.
    pub fn pop(&mut self, species: &str) -> Option<&'a SecondaryRecord> {
        self.buckets.get_mut(species)?.pop_front()
    }

    /// Records still waiting in any bucket.
    pub fn remaining(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }

    /// Records dropped for lacking a species name.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// Counters describing one player's merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Stored shinies visited.
    pub shinies: usize,
    /// Stored shinies that received a ShinyBoard record.
    pub matched: usize,
    /// Stored shinies left with only the strip step applied.
    pub unmatched_local: usize,
    /// ShinyBoard records never paired with a stored shiny.
    pub unused_secondary: usize,
    /// ShinyBoard records without a species name.
    pub discarded_secondary: usize,
}

/// Merge one player's ShinyBoard records into their stored record.
///
/// An absent record, or one without a `shinies` object, comes back
/// unchanged. Shiny entries that are not objects are carried over as-is.
pub fn merge_player(
    record: Option<&PlayerRecord>,
    secondary: &[SecondaryRecord],
    fields: &MergeFields,
) -> Option<PlayerRecord> {
    merge_player_with_stats(record, secondary, fields).0
}

/// Same as [`merge_player`], also returning pairing counters.
pub fn merge_player_with_stats(
    record: Option<&PlayerRecord>,
    secondary: &[SecondaryRecord],
    fields: &MergeFields,
) -> (Option<PlayerRecord>, MergeStats) {
    let record = match record {
        Some(r) => r,
        None => return (None, MergeStats::default()),
    };
    let shinies = match record.shinies() {
        Some(s) => s,
        None => return (Some(record.clone()), MergeStats::default()),
    };

    let mut buckets = SpeciesBuckets::from_records(secondary);
    let to_strip = fields.fields_to_strip();
    let mut stats = MergeStats {
        shinies: shinies.len(),
        discarded_secondary: buckets.discarded(),
        ..MergeStats::default()
    };

    let mut merged = Map::with_capacity(shinies.len());
    for (id, entry) in shinies {
        let mut working = entry.clone();
        let matched = match working.as_object_mut() {
            Some(shiny) => {
                for field in &to_strip {
                    shiny.shift_remove(*field);
                }
                match shiny_species(shiny).and_then(|species| buckets.pop(&species)) {
                    Some(source) => {
                        overlay_fields(shiny, source, fields.mergeable());
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };
        if matched {
            stats.matched += 1;
        } else {
            stats.unmatched_local += 1;
        }
        merged.insert(id.clone(), working);
    }

    stats.unused_secondary = buckets.remaining();

    let mut updated = record.clone();
    if let Some(slot) = updated.shinies_mut() {
        *slot = merged;
    }
    (Some(updated), stats)
}

/// Copy the listed fields that `source` actually carries onto `target`.
fn overlay_fields(target: &mut ShinyRecord, source: &SecondaryRecord, mergeable: &[String]) {
    for field in mergeable {
        if let Some(value) = source.field(field) {
            target.insert(field.clone(), value.clone());
        }
    }
}
