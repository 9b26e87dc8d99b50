use std::path::PathBuf;

use crate::markets::ProjectorParams;
use crate::store;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub db_path: Option<PathBuf>,
    pub projector: ProjectorParams,
    pub batch_size: usize,
    pub recent_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: store::default_db_path(),
            projector: ProjectorParams::default(),
            batch_size: 100,
            recent_window: 10,
        }
    }
}

impl PipelineConfig {
    /// Loads `.env.local` and `.env` (if present) and reads the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable or out-of-range values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let probability = |key: &str, fallback: f64| {
            lookup(key)
                .and_then(|val| val.trim().parse::<f64>().ok())
                .filter(|val| (0.0..=1.0).contains(val))
                .unwrap_or(fallback)
        };
        let count = |key: &str, fallback: usize| {
            lookup(key)
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(fallback)
                .max(1)
        };

        Self {
            db_path: lookup("PATTERN_DB_PATH")
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
                .map(PathBuf::from)
                .or(defaults.db_path),
            projector: ProjectorParams {
                base_rate_over35: probability(
                    "PATTERN_BASE_RATE_OVER35",
                    defaults.projector.base_rate_over35,
                ),
                accuracy_over35: probability(
                    "PATTERN_ACCURACY_OVER35",
                    defaults.projector.accuracy_over35,
                ),
                accuracy_over45: probability(
                    "PATTERN_ACCURACY_OVER45",
                    defaults.projector.accuracy_over45,
                ),
            },
            batch_size: count("PATTERN_BATCH_SIZE", defaults.batch_size),
            recent_window: count("PATTERN_RECENT_WINDOW", defaults.recent_window),
        }
    }
}

/// Value of `--name=value` or `--name value` among `args`.
pub fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(val) = arg.strip_prefix(&prefix) {
            let trimmed = val.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

/// Arguments that are neither flags nor flag values.
pub fn positional_args(args: &[String], value_flags: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if value_flags.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lookup_overrides_and_rejects_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PATTERN_DB_PATH", "/tmp/p.sqlite"),
            ("PATTERN_BASE_RATE_OVER35", "0.31"),
            ("PATTERN_ACCURACY_OVER35", "1.7"),
            ("PATTERN_BATCH_SIZE", "0"),
            ("PATTERN_RECENT_WINDOW", "abc"),
        ]);
        let cfg = PipelineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/p.sqlite")));
        assert_eq!(cfg.projector.base_rate_over35, 0.31);
        assert_eq!(cfg.projector.accuracy_over35, 0.679);
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.recent_window, 10);
    }

    #[test]
    fn flags_in_both_spellings() {
        let a = args(&["--db=/x.sqlite", "--batch-size", "25", "case.json"]);
        assert_eq!(flag_value(&a, "--db").as_deref(), Some("/x.sqlite"));
        assert_eq!(flag_value(&a, "--batch-size").as_deref(), Some("25"));
        assert_eq!(flag_value(&a, "--limit"), None);
        assert_eq!(positional_args(&a, &["--batch-size"]), vec!["case.json".to_string()]);
    }
}
