//! Environment-driven configuration.
//!
//! | variable | default |
//! |----------|---------|
//! | `STREAM_ENGINE_LIBRARY` | platform library file name, resolved by the OS loader |
//! | `STREAM_ENGINE_NATIVE_LOG` | `true` |
//! | `STREAM_ENGINE_NATIVE_LOG_LEVEL` | `warn` |
//!
//! Unparseable values fall back to the default.

use crate::types::LogLevel;
use std::path::PathBuf;

pub const ENV_LIBRARY: &str = "STREAM_ENGINE_LIBRARY";
pub const ENV_NATIVE_LOG: &str = "STREAM_ENGINE_NATIVE_LOG";
pub const ENV_NATIVE_LOG_LEVEL: &str = "STREAM_ENGINE_NATIVE_LOG_LEVEL";

#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAME: &str = "tobii_stream_engine.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAME: &str = "libtobii_stream_engine.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY_NAME: &str = "libtobii_stream_engine.so";

/// How to find the native library and what to do with its log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path or bare file name handed to the OS loader.
    pub library_path: PathBuf,
    /// Forward native log lines into the `log` facade.
    pub forward_native_log: bool,
    /// Most verbose native level forwarded.
    pub native_log_level: LogLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from(DEFAULT_LIBRARY_NAME),
            forward_native_log: true,
            native_log_level: LogLevel::Warn,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let library_path = lookup(ENV_LIBRARY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.library_path);
        let forward_native_log = lookup(ENV_NATIVE_LOG)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.forward_native_log);
        let native_log_level = lookup(ENV_NATIVE_LOG_LEVEL)
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(defaults.native_log_level);

        Self {
            library_path,
            forward_native_log,
            native_log_level,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
