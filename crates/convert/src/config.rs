use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

/// Headless converter binaries probed in order when none is configured.
const CONVERTER_CANDIDATES: &[&str] = &["soffice", "libreoffice"];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How the external converter is run. Built once per session; env
/// variables override discovery for tests and odd installs.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub binary: Option<PathBuf>,
    pub timeout: Duration,
    /// When set, raw converter stderr is attached to failure reports.
    pub diagnostics: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout: DEFAULT_TIMEOUT,
            diagnostics: false,
        }
    }
}

impl ConverterConfig {
    /// Discover a converter on PATH, honoring `PENMARK_CONVERTER`,
    /// `PENMARK_CONVERT_TIMEOUT_SECS` and `PENMARK_DIAGNOSTICS`.
    pub fn from_env() -> Self {
        let binary = std::env::var_os("PENMARK_CONVERTER")
            .map(PathBuf::from)
            .or_else(|| {
                CONVERTER_CANDIDATES
                    .iter()
                    .find_map(|name| which::which(name).ok())
            });
        if let Some(binary) = &binary {
            debug!(binary = %binary.display(), "converter discovered");
        }

        let timeout = std::env::var("PENMARK_CONVERT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let diagnostics = std::env::var_os("PENMARK_DIAGNOSTICS").is_some();

        Self {
            binary,
            timeout,
            diagnostics,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_apply() {
        let config = ConverterConfig::default()
            .with_binary("/usr/bin/true")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.binary.as_deref(), Some(std::path::Path::new("/usr/bin/true")));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
