//! String-keyed plugin arguments with typed extraction.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

/// Raw plugin configuration, a mapping from option name to string value.
/// Typed values are pulled out at session open; unknown keys are reported
/// once via [`Arguments::warn_unknown`].
#[derive(Debug, Clone, Default)]
pub struct Arguments(BTreeMap<String, String>);

impl Arguments {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Duration values use the compact `30s` / `1m` / `2h` / `500ms` form.
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        self.get(key).and_then(parse_duration)
    }

    /// All entries whose key starts with `prefix`, keyed by the remainder.
    pub fn prefixed<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.0.iter().filter_map(move |(k, v)| {
            k.strip_prefix(prefix).map(|rest| (rest, v.as_str()))
        })
    }

    /// Log every key that is neither listed nor covered by a known prefix.
    pub fn warn_unknown(&self, plugin: &str, known: &[&str], prefixes: &[&str]) {
        for key in self.0.keys() {
            let recognized = known.contains(&key.as_str())
                || prefixes.iter().any(|p| key.starts_with(p));
            if !recognized {
                warn!(plugin, key = %key, "ignoring unknown plugin argument");
            }
        }
    }
}

impl FromIterator<(String, String)> for Arguments {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `"90s"`, `"1m"`, `"2h"`, `"500ms"` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => Some(Duration::from_secs(amount * 60)),
        "h" => Some(Duration::from_secs(amount * 3600)),
        _ => None,
    }
}
