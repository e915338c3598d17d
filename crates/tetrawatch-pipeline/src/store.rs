//! Persisted calibrations.

use std::{collections::BTreeMap, fmt, io, str::FromStr};

use tetrawatch_vision::calibration::Calibration;
use tracing::debug;

const CALIBRATION_PREFIX: &str = "calibration/";

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StoreError {
    #[display("cannot access '{key}'")]
    Io { key: String, source: io::Error },
    #[display("cannot (de)serialize '{key}'")]
    Serialization {
        key: String,
        source: serde_json::Error,
    },
}

/// Byte storage addressed by string keys.
///
/// Keys consist of ASCII alphanumerics, `-`, `_`, `.` and `/`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("invalid profile '{input}', expected 'device/game' made of [A-Za-z0-9_.-]")]
pub struct ParseProfileKeyError {
    #[error(not(source))]
    input: String,
}

/// Identifies the device and game a calibration belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileKey {
    device: String,
    game: String,
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl ProfileKey {
    pub fn new(device: &str, game: &str) -> Result<Self, ParseProfileKeyError> {
        if !valid_segment(device) || !valid_segment(game) {
            return Err(ParseProfileKeyError {
                input: format!("{device}/{game}"),
            });
        }
        Ok(Self {
            device: device.to_owned(),
            game: game.to_owned(),
        })
    }

    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    #[must_use]
    pub fn game(&self) -> &str {
        &self.game
    }

    fn storage_key(&self) -> String {
        format!("{CALIBRATION_PREFIX}{self}")
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.game)
    }
}

impl FromStr for ProfileKey {
    type Err = ParseProfileKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseProfileKeyError {
            input: s.to_owned(),
        };
        let (device, game) = s.split_once('/').ok_or_else(error)?;
        Self::new(device, game).map_err(|_| error())
    }
}

/// Saves and loads calibrations per profile, as JSON.
#[derive(Debug)]
pub struct CalibrationStore<S> {
    store: S,
}

impl<S> CalibrationStore<S>
where
    S: KeyValueStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn save(&mut self, key: &ProfileKey, calibration: &Calibration) -> Result<(), StoreError> {
        let storage_key = key.storage_key();
        let bytes = serde_json::to_vec_pretty(calibration).map_err(|source| {
            StoreError::Serialization {
                key: storage_key.clone(),
                source,
            }
        })?;
        self.store.put(&storage_key, &bytes)?;
        debug!(profile = %key, "calibration saved");
        Ok(())
    }

    pub fn load(&self, key: &ProfileKey) -> Result<Option<Calibration>, StoreError> {
        let storage_key = key.storage_key();
        let Some(bytes) = self.store.get(&storage_key)? else {
            return Ok(None);
        };
        let calibration = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Serialization {
                key: storage_key,
                source,
            })?;
        Ok(Some(calibration))
    }

    /// Profiles that have a saved calibration, sorted.
    pub fn profiles(&self) -> Result<Vec<ProfileKey>, StoreError> {
        let keys = self.store.keys()?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(CALIBRATION_PREFIX))
            .filter_map(|profile| profile.parse().ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use tetrawatch_vision::calibration::{CalibrationSource, PixelRect};

    use super::*;

    fn calibration() -> Calibration {
        Calibration::from_rect(
            PixelRect::new(100, 48, 160, 320),
            20,
            10,
            0.93,
            CalibrationSource::Detected,
        )
    }

    #[test]
    fn test_calibration_round_trip() {
        let mut store = CalibrationStore::new(MemoryStore::new());
        let key: ProfileKey = "laptop/tetris-99".parse().unwrap();
        let saved = calibration();
        store.save(&key, &saved).unwrap();
        let loaded = store.load(&key).unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_missing_profile_loads_none() {
        let store = CalibrationStore::new(MemoryStore::new());
        let key = ProfileKey::new("desk", "puyo").unwrap();
        assert!(store.load(&key).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_serialization_error() {
        let mut memory = MemoryStore::new();
        memory.put("calibration/desk/tgm", b"{not json").unwrap();
        let store = CalibrationStore::new(memory);
        let key = ProfileKey::new("desk", "tgm").unwrap();
        assert!(matches!(
            store.load(&key),
            Err(StoreError::Serialization { .. })
        ));
    }

    #[test]
    fn test_profiles_are_listed() {
        let mut store = CalibrationStore::new(MemoryStore::new());
        let b = ProfileKey::new("b", "game").unwrap();
        let a = ProfileKey::new("a", "game").unwrap();
        store.save(&b, &calibration()).unwrap();
        store.save(&a, &calibration()).unwrap();
        assert_eq!(store.profiles().unwrap(), [a, b]);
        assert_eq!(store.store().keys().unwrap().len(), 2);
    }

    #[test]
    fn test_profile_key_parsing() {
        let key: ProfileKey = "pc-1/jstris".parse().unwrap();
        assert_eq!((key.device(), key.game()), ("pc-1", "jstris"));
        assert_eq!(key.to_string(), "pc-1/jstris");
        assert!("no-slash".parse::<ProfileKey>().is_err());
        assert!("a/b/c".parse::<ProfileKey>().is_err());
        assert!("/game".parse::<ProfileKey>().is_err());
        assert!("dev/ga me".parse::<ProfileKey>().is_err());
    }
}
