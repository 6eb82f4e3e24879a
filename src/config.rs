use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Watchdog period used when nothing else is configured.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayConfig {
    /// How often the watchdog checks for placements no flush picked up.
    pub watchdog_interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
        }
    }
}

impl OverlayConfig {
    pub fn from_flags(flags: &ConfigFlags) -> Self {
        flags
            .watchdog_ms
            .filter(|ms| *ms > 0)
            .map_or_else(Self::default, |ms| Self {
                watchdog_interval: Duration::from_millis(ms),
            })
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    /// Typeset on the host thread, one queue entry at a time.
    Fifo,
    /// Typeset on a background worker thread.
    Threaded,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub renderer: Option<RendererKind>,
    pub watchdog_ms: Option<u64>,
    pub perf: bool,
    pub no_color: bool,
    pub render_debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            renderer: other.renderer.or(self.renderer),
            watchdog_ms: other.watchdog_ms.or(self.watchdog_ms),
            perf: self.perf || other.perf,
            no_color: self.no_color || other.no_color,
            render_debug_log: other
                .render_debug_log
                .clone()
                .or_else(|| self.render_debug_log.clone()),
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("formula-overlay").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("formula-overlay")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("formula-overlay").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("formula-overlay")
                .join("config");
        }
    }

    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".formularc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# formula-overlay defaults (saved with --save)".to_string()];
    if let Some(renderer) = flags.renderer {
        let name = match renderer {
            RendererKind::Fifo => "fifo",
            RendererKind::Threaded => "threaded",
        };
        lines.push(format!("--renderer {name}"));
    }
    if let Some(ms) = flags.watchdog_ms {
        lines.push(format!("--watchdog-ms {ms}"));
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if flags.no_color {
        lines.push("--no-color".to_string());
    }
    if let Some(path) = &flags.render_debug_log {
        lines.push(format!("--render-debug-log {}", path.display()));
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the flags this module knows out of a token list. Unknown tokens
/// (the program name, the file argument) are skipped.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "--perf" => flags.perf = true,
            "--no-color" => flags.no_color = true,
            "--renderer" | "--watchdog-ms" | "--render-debug-log" => {
                if let Some(next) = tokens.get(i + 1) {
                    apply_value(&mut flags, token, next);
                    i += 1;
                }
            }
            _ => {
                if let Some((name, value)) = token.split_once('=') {
                    apply_value(&mut flags, name, value);
                }
            }
        }
        i += 1;
    }
    flags
}

fn apply_value(flags: &mut ConfigFlags, name: &str, value: &str) {
    match name {
        "--renderer" => flags.renderer = parse_renderer(value),
        "--watchdog-ms" => flags.watchdog_ms = value.parse().ok(),
        "--render-debug-log" => flags.render_debug_log = Some(PathBuf::from(value)),
        _ => {}
    }
}

fn parse_renderer(s: &str) -> Option<RendererKind> {
    match s {
        "fifo" => Some(RendererKind::Fifo),
        "threaded" => Some(RendererKind::Threaded),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_flag_tokens_extracts_known_flags() {
        let args = vec![
            "formula-overlay".to_string(),
            "--renderer".to_string(),
            "threaded".to_string(),
            "--watchdog-ms=250".to_string(),
            "--render-debug-log=render.log".to_string(),
            "--no-color".to_string(),
            "notes.md".to_string(),
        ];
        let flags = parse_flag_tokens(&args);
        assert_eq!(flags.renderer, Some(RendererKind::Threaded));
        assert_eq!(flags.watchdog_ms, Some(250));
        assert_eq!(flags.render_debug_log, Some(PathBuf::from("render.log")));
        assert!(flags.no_color);
        assert!(!flags.perf);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let args = vec![
            "--renderer".to_string(),
            "gpu".to_string(),
            "--watchdog-ms".to_string(),
            "soon".to_string(),
        ];
        let flags = parse_flag_tokens(&args);
        assert_eq!(flags.renderer, None);
        assert_eq!(flags.watchdog_ms, None);
    }

    #[test]
    fn test_config_union_merges_cli_over_file_for_options() {
        let file = ConfigFlags {
            perf: true,
            renderer: Some(RendererKind::Fifo),
            watchdog_ms: Some(1000),
            ..ConfigFlags::default()
        };
        let cli = ConfigFlags {
            no_color: true,
            renderer: Some(RendererKind::Threaded),
            ..ConfigFlags::default()
        };
        let merged = file.union(&cli);
        assert!(merged.perf);
        assert!(merged.no_color);
        assert_eq!(merged.renderer, Some(RendererKind::Threaded));
        assert_eq!(merged.watchdog_ms, Some(1000));
    }

    #[test]
    fn test_overlay_config_from_flags() {
        assert_eq!(
            OverlayConfig::from_flags(&ConfigFlags::default()).watchdog_interval,
            DEFAULT_WATCHDOG_INTERVAL
        );
        let flags = ConfigFlags {
            watchdog_ms: Some(40),
            ..ConfigFlags::default()
        };
        assert_eq!(
            OverlayConfig::from_flags(&flags).watchdog_interval,
            Duration::from_millis(40)
        );
        let zero = ConfigFlags {
            watchdog_ms: Some(0),
            ..ConfigFlags::default()
        };
        assert_eq!(OverlayConfig::from_flags(&zero), OverlayConfig::default());
    }

    #[test]
    fn test_save_load_and_clear_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(".formularc");
        let flags = ConfigFlags {
            renderer: Some(RendererKind::Threaded),
            watchdog_ms: Some(750),
            perf: true,
            no_color: true,
            render_debug_log: Some(PathBuf::from("render.log")),
        };

        save_config_flags(&path, &flags).unwrap();
        let loaded = load_config_flags(&path).unwrap();
        assert_eq!(loaded, flags);

        clear_config_flags(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(load_config_flags(&path).unwrap(), ConfigFlags::default());
    }
}
