//! User configuration – reads/writes `~/.voxmap/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use voxmap_types::TreeConfig;

/// Persisted user configuration stored in `~/.voxmap/config.toml`.
///
/// ```toml
/// output_path = "map.vxom"
///
/// [tree]
/// resolution = 0.1
/// prob_hit = 0.7
/// prob_miss = 0.4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Parameters for newly built trees.
    #[serde(default)]
    pub tree: TreeConfig,

    /// Where `voxmap build` writes its map unless `--output` is given.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("map.vxom")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            output_path: default_output_path(),
        }
    }
}

/// Return the path to `~/.voxmap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".voxmap").join("config.toml")
}

/// Load the config from disk, falling back to defaults when the file does
/// not exist.  Environment overrides are applied either way.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `VOXMAP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VOXMAP_RESOLUTION` | `tree.resolution` |
/// | `VOXMAP_PROB_HIT` | `tree.prob_hit` |
/// | `VOXMAP_PROB_MISS` | `tree.prob_miss` |
/// | `VOXMAP_OUTPUT` | `output_path` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VOXMAP_RESOLUTION")
        && let Ok(res) = v.parse::<f64>() {
            cfg.tree.resolution = res;
        }
    if let Ok(v) = std::env::var("VOXMAP_PROB_HIT")
        && let Ok(p) = v.parse::<f64>() {
            cfg.tree.prob_hit = p;
        }
    if let Ok(v) = std::env::var("VOXMAP_PROB_MISS")
        && let Ok(p) = v.parse::<f64>() {
            cfg.tree.prob_miss = p;
        }
    if let Ok(v) = std::env::var("VOXMAP_OUTPUT")
        && !v.is_empty() {
            cfg.output_path = PathBuf::from(v);
        }
}

/// Save the config to disk, creating `~/.voxmap/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
