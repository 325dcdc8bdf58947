//! Daemon configuration: a single INI-style file with sections `composer`,
//! `users`, and `repos`.
//!
//! Every key has a built-in default mirroring the upstream tool's own
//! defaults, so the daemon starts with no config file present at all.

use std::path::{Path, PathBuf};

use ini::Ini;

use crate::errors::{ComposerError, Result};

/// Top-level daemon configuration, assembled from defaults plus an optional
/// INI file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the content-addressed blueprint store.
    pub blueprints_dir: PathBuf,
    /// Root directory for the compose queue (`queue/` and `results/`).
    pub queue_dir: PathBuf,
    /// Directory scanned for supported compose types and the image builder.
    pub share_dir: PathBuf,
    /// Unix domain socket path the API listens on.
    pub socket_path: PathBuf,
    /// Allow-listed user names (`users` section); empty means "allow all".
    pub allowed_users: Vec<String>,
    /// Whether to enable the host's system repositories.
    pub use_system_repos: bool,
    /// Glob patterns of repo names to enable.
    pub enabled_repos: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            blueprints_dir: PathBuf::from("/var/lib/composer/blueprints"),
            queue_dir: PathBuf::from("/var/lib/composer"),
            share_dir: PathBuf::from("/usr/share/composer"),
            socket_path: PathBuf::from("/run/composer/socket"),
            allowed_users: vec!["root".to_string()],
            use_system_repos: true,
            enabled_repos: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration, overlaying `conf_file` (if it exists) onto the
    /// built-in defaults. A missing file is not an error; a malformed one
    /// is.
    pub fn load(conf_file: &Path) -> Result<Config> {
        let mut conf = Config::default();
        if !conf_file.is_file() {
            return Ok(conf);
        }

        let ini = Ini::load_from_file(conf_file)
            .map_err(|e| ComposerError::ParseError(format!("config {}: {e}", conf_file.display())))?;

        if let Some(section) = ini.section(Some("composer")) {
            if let Some(v) = section.get("blueprints_dir") {
                conf.blueprints_dir = PathBuf::from(v);
            }
            if let Some(v) = section.get("queue_dir") {
                conf.queue_dir = PathBuf::from(v);
            }
            if let Some(v) = section.get("share_dir") {
                conf.share_dir = PathBuf::from(v);
            }
            if let Some(v) = section.get("socket_path") {
                conf.socket_path = PathBuf::from(v);
            }
        }

        if let Some(section) = ini.section(Some("users")) {
            let users: Vec<String> = section
                .iter()
                .filter(|(_, enabled)| *enabled == "1")
                .map(|(name, _)| name.to_string())
                .collect();
            if !users.is_empty() {
                conf.allowed_users = users;
            }
        }

        if let Some(section) = ini.section(Some("repos")) {
            if let Some(v) = section.get("use_system_repos") {
                conf.use_system_repos = v == "1";
            }
            if let Some(v) = section.get("enabled") {
                conf.enabled_repos = v.split(',').map(|s| s.trim().to_string()).collect();
            }
        }

        Ok(conf)
    }

    pub fn queue_new_dir(&self) -> PathBuf {
        self.queue_dir.join("queue").join("new")
    }

    pub fn queue_run_dir(&self) -> PathBuf {
        self.queue_dir.join("queue").join("run")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.queue_dir.join("results")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_file_missing() {
        let conf = Config::load(Path::new("/nonexistent/composer.conf")).unwrap();
        assert_eq!(conf.allowed_users, vec!["root".to_string()]);
    }

    #[test]
    fn overlays_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer.conf");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[composer]\nblueprints_dir = /tmp/bp\n\n[users]\nroot = 1\nalice = 1\nbob = 0\n\n[repos]\nuse_system_repos = 0\nenabled = fedora-*,epel\n"
        )
        .unwrap();

        let conf = Config::load(&path).unwrap();
        assert_eq!(conf.blueprints_dir, PathBuf::from("/tmp/bp"));
        assert_eq!(conf.allowed_users, vec!["root".to_string(), "alice".to_string()]);
        assert!(!conf.use_system_repos);
        assert_eq!(conf.enabled_repos, vec!["fedora-*".to_string(), "epel".to_string()]);
    }
}
