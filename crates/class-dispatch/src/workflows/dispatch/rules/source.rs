use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use tracing::{debug, info};

use super::{RuleConfig, RuleConfigError};

/// Read-only access to the admin settings table.
pub trait RuleSource: Send + Sync {
    fn load_entries(&self) -> Result<BTreeMap<String, String>, RuleSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuleSourceError {
    #[error("failed to read settings export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("setting `{0}` appears more than once")]
    DuplicateKey(String),
    #[error(transparent)]
    Config(#[from] RuleConfigError),
}

/// `key,value` CSV export of the settings table.
#[derive(Debug, Clone)]
pub struct CsvRuleSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    key: String,
    #[serde(default)]
    value: String,
}

impl CsvRuleSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse<R: Read>(reader: R) -> Result<BTreeMap<String, String>, RuleSourceError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let mut entries = BTreeMap::new();

        for row in csv_reader.deserialize::<SettingRow>() {
            let row = row?;
            if row.key.is_empty() {
                continue;
            }
            if entries.contains_key(&row.key) {
                return Err(RuleSourceError::DuplicateKey(row.key));
            }
            entries.insert(row.key, row.value);
        }

        Ok(entries)
    }
}

impl RuleSource for CsvRuleSource {
    fn load_entries(&self) -> Result<BTreeMap<String, String>, RuleSourceError> {
        let file = std::fs::File::open(&self.path)?;
        Self::parse(file)
    }
}

/// In-memory settings table, used by the demo service and tests.
#[derive(Debug, Default)]
pub struct StaticRuleSource {
    entries: RwLock<BTreeMap<String, String>>,
}

impl StaticRuleSource {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Mimics an admin edit on the settings screen.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }
}

impl RuleSource for StaticRuleSource {
    fn load_entries(&self) -> Result<BTreeMap<String, String>, RuleSourceError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Read-through cache over a [`RuleSource`]. Settings saves call [`RuleConfigCache::invalidate`].
pub struct RuleConfigCache<S> {
    source: S,
    cached: RwLock<Option<Arc<RuleConfig>>>,
}

impl<S: RuleSource> RuleConfigCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn snapshot(&self) -> Result<Arc<RuleConfig>, RuleSourceError> {
        if let Some(config) = self
            .cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(config));
        }

        self.reload()
    }

    /// Parses the source eagerly. A failed parse leaves the previous snapshot in place.
    pub fn reload(&self) -> Result<Arc<RuleConfig>, RuleSourceError> {
        let entries = self.source.load_entries()?;
        let config = Arc::new(RuleConfig::from_entries(&entries)?);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&config));
        info!(settings = entries.len(), "rule configuration loaded");
        Ok(config)
    }

    pub fn invalidate(&self) {
        self.cached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("rule configuration cache invalidated");
    }
}

/// Hands out the rule snapshot a single computation runs against.
pub trait RuleProvider: Send + Sync {
    fn current(&self) -> Result<Arc<RuleConfig>, RuleSourceError>;
}

impl<S: RuleSource> RuleProvider for RuleConfigCache<S> {
    fn current(&self) -> Result<Arc<RuleConfig>, RuleSourceError> {
        self.snapshot()
    }
}

impl RuleProvider for Arc<RuleConfig> {
    fn current(&self) -> Result<Arc<RuleConfig>, RuleSourceError> {
        Ok(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SETTINGS_CSV: &str = "key,value
# session fees
sessionFees.2,80000
sessionFees.4, 150000
transport_0_20,0
transport_20_40,15000
transport_40_60,25000
transport_60_80,35000
transport_80_plus,50000
grades.internal_level1.minClasses,0
grades.internal_level1.minRating,0
grades.internal_level1.feeMultiplier,1.0
grades.internal_level1.priority,1
specialAllowances.weekend,20000
specialAllowances.holiday,30000
specialAllowances.emergency,15000
specialAllowances.multipleClasses,10000
minSessionFee,70000
maxSessionFee,150000
";

    #[test]
    fn parses_settings_export() {
        let entries = CsvRuleSource::parse(Cursor::new(SETTINGS_CSV)).expect("valid csv");

        assert_eq!(entries.get("sessionFees.4").map(String::as_str), Some("150000"));
        assert!(!entries.keys().any(|key| key.starts_with('#')));
        RuleConfig::from_entries(&entries).expect("export holds a complete rule set");
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let csv = "key,value\nminSessionFee,1\nminSessionFee,2\n";
        match CsvRuleSource::parse(Cursor::new(csv)) {
            Err(RuleSourceError::DuplicateKey(key)) => assert_eq!(key, "minSessionFee"),
            other => panic!("expected duplicate key error, got {other:?}"),
        }
    }

    #[test]
    fn cache_serves_snapshot_until_invalidated() {
        let entries = CsvRuleSource::parse(Cursor::new(SETTINGS_CSV)).expect("valid csv");
        let cache = RuleConfigCache::new(StaticRuleSource::new(entries));

        let first = cache.snapshot().expect("loads");
        cache.source().set("minSessionFee", "90000");
        let cached = cache.snapshot().expect("cached");
        assert!(Arc::ptr_eq(&first, &cached));
        assert_eq!(cached.fee_bounds.min, 70_000);

        cache.invalidate();
        let refreshed = cache.snapshot().expect("reloads");
        assert_eq!(refreshed.fee_bounds.min, 90_000);
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let entries = CsvRuleSource::parse(Cursor::new(SETTINGS_CSV)).expect("valid csv");
        let cache = RuleConfigCache::new(StaticRuleSource::new(entries));
        cache.snapshot().expect("loads");

        cache.source().set("maxSessionFee", "not-a-number");
        assert!(matches!(
            cache.reload(),
            Err(RuleSourceError::Config(RuleConfigError::Malformed { .. }))
        ));
        assert_eq!(cache.snapshot().expect("still cached").fee_bounds.max, 150_000);
    }
}
