//! Per-type compile statistics.

use std::collections::BTreeMap;
use std::time::Duration;

/// Compile timings of one asset type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeStats {
    /// Instances compiled.
    pub count: usize,
    /// Time spent compiling.
    pub total: Duration,
    /// Longest single compile.
    pub longest: Duration,
    /// The instance that took longest.
    pub slowest: String,
}

/// Compile statistics of one session, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    types: BTreeMap<String, TypeStats>,
}

impl CompileStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one compile.
    pub fn record(&mut self, type_name: &str, instance_name: &str, elapsed: Duration) {
        let stats = self.types.entry(type_name.to_string()).or_default();
        stats.count += 1;
        stats.total += elapsed;
        if elapsed >= stats.longest {
            stats.longest = elapsed;
            stats.slowest = instance_name.to_string();
        }
    }

    /// Statistics of `type_name`.
    pub fn get(&self, type_name: &str) -> Option<&TypeStats> {
        self.types.get(type_name)
    }

    /// Instances compiled across all types.
    pub fn total_count(&self) -> usize {
        self.types.values().map(|s| s.count).sum()
    }

    /// Types in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeStats)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Forgets everything recorded.
    pub fn clear(&mut self) {
        self.types.clear();
    }

    /// Logs one line per type.
    pub fn log(&self) {
        for (type_name, stats) in &self.types {
            tracing::info!(
                type_name = %type_name,
                count = stats.count,
                total_ms = stats.total.as_millis() as u64,
                longest_ms = stats.longest.as_millis() as u64,
                slowest = %stats.slowest,
                "compile statistics"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_slowest_instance() {
        let mut stats = CompileStats::new();
        stats.record("Unit", "a", Duration::from_millis(5));
        stats.record("Unit", "b", Duration::from_millis(9));
        stats.record("Unit", "c", Duration::from_millis(2));
        stats.record("Weapon", "w", Duration::from_millis(1));
        let unit = stats.get("Unit").unwrap();
        assert_eq!(unit.count, 3);
        assert_eq!(unit.total, Duration::from_millis(16));
        assert_eq!(unit.longest, Duration::from_millis(9));
        assert_eq!(unit.slowest, "b");
        assert_eq!(stats.total_count(), 4);
        assert_eq!(stats.iter().map(|(t, _)| t).collect::<Vec<_>>(), ["Unit", "Weapon"]);
    }
}
