use facenorm_core::Metric;
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Metric used by `compare` when `--metric` is not given.
    pub default_metric: Metric,
    /// Worker threads for batch alignment (0 = rayon default).
    pub threads: usize,
    /// Directory aligned crops are written to when `--out-dir` is not given.
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from `FACENORM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_metric = match lookup("FACENORM_METRIC") {
            Some(name) => name.parse().unwrap_or_else(|e| {
                tracing::warn!(%name, error = %e, "ignoring FACENORM_METRIC");
                Metric::default()
            }),
            None => Metric::default(),
        };

        Self {
            default_metric,
            threads: parse_or(lookup("FACENORM_THREADS"), 0),
            output_dir: lookup("FACENORM_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.default_metric, Metric::CosineNorm);
        assert_eq!(c.threads, 0);
        assert_eq!(c.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("FACENORM_METRIC", "euclidean"),
            ("FACENORM_THREADS", "4"),
            ("FACENORM_OUTPUT_DIR", "/tmp/crops"),
        ]);
        assert_eq!(c.default_metric, Metric::Euclidean);
        assert_eq!(c.threads, 4);
        assert_eq!(c.output_dir, PathBuf::from("/tmp/crops"));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let c = config(&[("FACENORM_METRIC", "hamming"), ("FACENORM_THREADS", "many")]);
        assert_eq!(c.default_metric, Metric::CosineNorm);
        assert_eq!(c.threads, 0);
    }
}
