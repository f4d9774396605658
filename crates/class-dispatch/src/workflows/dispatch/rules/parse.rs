use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::str::FromStr;

use super::RuleConfigError;

/// Typed accessors over the raw settings map. Every accessor trims the stored value.
pub(super) struct Entries<'a> {
    map: &'a BTreeMap<String, String>,
}

impl<'a> Entries<'a> {
    pub(super) fn new(map: &'a BTreeMap<String, String>) -> Self {
        Self { map }
    }

    pub(super) fn raw(&self, key: &str) -> Option<&'a str> {
        self.map
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Keys under `prefix.` with the prefix stripped, in key order.
    pub(super) fn with_prefix(&self, prefix: &str) -> Vec<(&'a str, &'a str)> {
        let dotted = format!("{prefix}.");
        self.map
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(dotted.as_str())
                    .map(|rest| (rest, value.trim()))
            })
            .collect()
    }

    pub(super) fn required<T: FromStr>(
        &self,
        key: &str,
        expected: &'static str,
    ) -> Result<T, RuleConfigError> {
        let raw = self
            .raw(key)
            .ok_or_else(|| RuleConfigError::MissingKey(key.to_string()))?;
        parse_value(key, raw, expected)
    }

    pub(super) fn optional<T: FromStr>(
        &self,
        key: &str,
        expected: &'static str,
    ) -> Result<Option<T>, RuleConfigError> {
        self.raw(key)
            .map(|raw| parse_value(key, raw, expected))
            .transpose()
    }
}

pub(super) fn parse_value<T: FromStr>(
    key: &str,
    raw: &str,
    expected: &'static str,
) -> Result<T, RuleConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RuleConfigError::Malformed {
            key: key.to_string(),
            value: raw.to_string(),
            expected,
        })
}

pub(super) fn within(
    key: &str,
    value: f64,
    range: RangeInclusive<f64>,
) -> Result<f64, RuleConfigError> {
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        Err(RuleConfigError::OutOfRange {
            key: key.to_string(),
            value: value.to_string(),
            range: format!("{}..={}", range.start(), range.end()),
        })
    }
}

/// Splits `a; b ;c` style lists, dropping blanks.
pub(super) fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
