// Shiny database data model: the player store, player records and the
// flattened ShinyBoard records that get merged into them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A single catch as stored in the shiny database. Free-form JSON object
/// with a mandatory `Pokemon` field.
pub type ShinyRecord = Map<String, Value>;

/// Species name field on every stored shiny.
pub const POKEMON_FIELD: &str = "Pokemon";

const SHINIES_FIELD: &str = "shinies";
const SHINY_COUNT_FIELD: &str = "shiny_count";

/// Trait flag marking a shiny that no longer counts toward the total.
const SOLD_FIELD: &str = "Sold";

/// Normalize a player or species name for matching (trimmed, lowercase).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalized species of a stored shiny, if it has a usable `Pokemon` field.
pub fn shiny_species(shiny: &ShinyRecord) -> Option<String> {
    shiny
        .get(POKEMON_FIELD)
        .and_then(Value::as_str)
        .map(normalize_name)
}

/// One player's entry in the shiny database.
///
/// Kept as the raw JSON value so that any shape the Worker holds, nulls and
/// odd field types included, is written back exactly as it was read. The
/// accessors only interpret the parts the merge needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerRecord {
    raw: Value,
}

impl PlayerRecord {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    /// Top-level field, when the record is an object.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// Set a top-level field, keeping its position if it already exists.
    /// Returns false and leaves the record alone when it is not an object.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.raw.as_object_mut() {
            Some(obj) => {
                obj.insert(name.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    /// Stored `shiny_count`, whatever its type.
    pub fn shiny_count(&self) -> Option<&Value> {
        self.field(SHINY_COUNT_FIELD)
    }

    /// Shinies keyed by record id, in document order. `None` unless
    /// `shinies` is a JSON object.
    pub fn shinies(&self) -> Option<&Map<String, Value>> {
        self.field(SHINIES_FIELD).and_then(Value::as_object)
    }

    pub fn shinies_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.raw.get_mut(SHINIES_FIELD).and_then(Value::as_object_mut)
    }

    /// Number of stored shiny entries (0 when the record has none).
    pub fn shiny_len(&self) -> usize {
        self.shinies().map_or(0, Map::len)
    }

    /// Recompute `shiny_count` as the number of shiny objects not marked
    /// sold. Entries that are not objects are not counted. Returns `None`
    /// without touching anything when the record is not an object.
    pub fn recalc_shiny_count(&mut self) -> Option<u64> {
        let count = self
            .shinies()
            .map(|shinies| {
                shinies
                    .values()
                    .filter_map(Value::as_object)
                    .filter(|s| s.get(SOLD_FIELD).and_then(Value::as_str) != Some("Yes"))
                    .count() as u64
            })
            .unwrap_or(0);
        self.set_field(SHINY_COUNT_FIELD, count).then_some(count)
    }
}

/// The whole shiny database document: player name -> record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerStore {
    players: IndexMap<String, PlayerRecord>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Player names in document order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.players.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&PlayerRecord> {
        self.players.get(key)
    }

    /// Insert or replace a player, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, record: PlayerRecord) {
        self.players.insert(key.into(), record);
    }

    /// Find the actual store key for an identity.
    ///
    /// An exact match wins. Otherwise names are compared trimmed and
    /// case-insensitively; if several keys collide the last one in document
    /// order is used.
    pub fn resolve_key(&self, identity: &str) -> Option<&str> {
        if let Some((key, _)) = self.players.get_key_value(identity) {
            return Some(key.as_str());
        }
        let wanted = normalize_name(identity);
        self.players
            .keys()
            .rev()
            .find(|key| normalize_name(key) == wanted)
            .map(String::as_str)
    }

    /// Copy of the store restricted to the given keys, in the order given.
    pub fn subset<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> PlayerStore {
        let mut players = IndexMap::new();
        for key in keys {
            if let Some(record) = self.players.get(key) {
                players.insert(key.to_string(), record.clone());
            }
        }
        PlayerStore { players }
    }

    /// SHA-256 hex digest of the serialized document.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl FromIterator<(String, PlayerRecord)> for PlayerStore {
    fn from_iter<T: IntoIterator<Item = (String, PlayerRecord)>>(iter: T) -> Self {
        PlayerStore {
            players: iter.into_iter().collect(),
        }
    }
}

/// One ShinyBoard catch, flattened from an API page.
///
/// `fields` only holds the attributes the API item actually carried; an
/// explicit JSON `null` counts as carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryRecord {
    pub pokemon_name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SecondaryRecord {
    pub fn new(pokemon_name: &str) -> Self {
        Self {
            pokemon_name: normalize_name(pokemon_name),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
