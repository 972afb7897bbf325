//! The sites file: registered feeds plus run settings.
//!
//! ```json
//! {
//!     "sites": [
//!         { "name": "Example", "url": "https://example.com/rss", "type": "rss", "enabled": true }
//!     ],
//!     "settings": { "request_timeout": 30, "retry_count": 3 }
//! }
//! ```
//!
//! The order of `sites` is the registry order, which decides which source
//! keeps a duplicated article.

use crate::config::RunConfig;
use crate::error::RegistryError;
use crate::models::Source;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: Vec<Source>,
    #[serde(default)]
    settings: RunConfig,
}

/// A sites file loaded into memory.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    file: SitesFile,
}

impl Registry {
    /// Read the sites file at `path`. A missing file is an empty registry.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let file = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Sites file not found; starting with an empty registry");
                SitesFile::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!(sites = file.sites.len(), "Loaded sites file");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sources(&self) -> &[Source] {
        &self.file.sites
    }

    pub fn settings(&self) -> &RunConfig {
        &self.file.settings
    }

    /// Register an enabled RSS source and persist the file.
    ///
    /// Surrounding whitespace is trimmed from both `name` and `url` before
    /// they are checked or stored.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::EmptyName`] if `name` is blank.
    /// * [`RegistryError::InvalidUrl`] unless `url` is an absolute http(s) URL.
    /// * [`RegistryError::DuplicateUrl`] or [`RegistryError::DuplicateName`]
    ///   if either is already registered.
    /// * I/O or JSON errors from writing the file.
    pub fn add(&mut self, name: &str, url: &str) -> Result<(), RegistryError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        validate_site_url(url)?;
        if self.file.sites.iter().any(|s| s.url == url) {
            return Err(RegistryError::DuplicateUrl(url.to_string()));
        }
        if self.file.sites.iter().any(|s| s.name == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        self.file.sites.push(Source::rss(name, url));
        self.save()?;
        info!(name, url, "Added site");
        Ok(())
    }

    /// Remove the source matching both `name` and `url` and persist the file.
    pub fn delete(&mut self, name: &str, url: &str) -> Result<(), RegistryError> {
        let (name, url) = (name.trim(), url.trim());
        let before = self.file.sites.len();
        self.file.sites.retain(|s| !(s.name == name && s.url == url));
        if self.file.sites.len() == before {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                url: url.to_string(),
            });
        }
        self.save()?;
        info!(name, url, "Deleted site");
        Ok(())
    }

    /// Write the registry back as indented UTF-8 JSON.
    pub fn save(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.file.serialize(&mut ser)?;
        buf.push(b'\n');
        fs::write(&self.path, buf)?;
        Ok(())
    }
}

fn validate_site_url(url: &str) -> Result<(), RegistryError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => Ok(()),
        _ => Err(RegistryError::InvalidUrl(url.to_string())),
    }
}
