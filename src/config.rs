//! The registered-database registry: a small JSON file mapping names to
//! database paths, plus the choice of default.
//!
//! All registry state lives behind an explicitly constructed
//! [`ConfigHandle`]; the only process-wide input is the pair of
//! environment variables consulted when resolving the current database.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::db::{find_db_root, DbSource, DB_PATH_OVERRIDE_VAR, DEFAULT_DB_PATH_VAR};
use crate::errors::KmerDbError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    default: Option<String>,
    databases: BTreeMap<String, PathBuf>,
}

/// Handle on the registry file. Cheap to construct; every operation
/// reads and rewrites the file.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    path: PathBuf,
}

impl ConfigHandle {
    pub fn new(path: PathBuf) -> Self {
        ConfigHandle { path }
    }

    /// The conventional registry location in the user config directory.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kmerdb").join("registry.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Registry> {
        if !self.path.is_file() {
            return Ok(Registry::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read registry {:?}", self.path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Malformed registry {:?}", self.path))
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
        let contents = serde_json::to_string_pretty(registry)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write registry {:?}", self.path))?;
        Ok(())
    }

    /// Registers a database directory under a name.
    pub fn register(&self, name: &str, path: &Path) -> Result<()> {
        let mut registry = self.load()?;
        registry.databases.insert(name.to_string(), path.to_path_buf());
        self.save(&registry)
    }

    /// Removes a registration; clears the default if it pointed there.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut registry = self.load()?;
        if registry.databases.remove(name).is_none() {
            return Err(KmerDbError::DatabaseNotRegistered(name.to_string()).into());
        }
        if registry.default.as_deref() == Some(name) {
            registry.default = None;
        }
        self.save(&registry)
    }

    pub fn get(&self, name: &str) -> Result<PathBuf> {
        self.load()?
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| KmerDbError::DatabaseNotRegistered(name.to_string()).into())
    }

    /// Marks a registered database as the default.
    pub fn set_default(&self, name: &str) -> Result<()> {
        let mut registry = self.load()?;
        if !registry.databases.contains_key(name) {
            return Err(KmerDbError::DatabaseNotRegistered(name.to_string()).into());
        }
        registry.default = Some(name.to_string());
        self.save(&registry)
    }

    /// Path of the registered default database, if one is set.
    pub fn get_default(&self) -> Result<Option<PathBuf>> {
        let registry = self.load()?;
        Ok(registry
            .default
            .as_ref()
            .and_then(|name| registry.databases.get(name))
            .cloned())
    }

    /// All registrations as `(name, path, is_default)`.
    pub fn list(&self) -> Result<Vec<(String, PathBuf, bool)>> {
        let registry = self.load()?;
        Ok(registry
            .databases
            .iter()
            .map(|(name, path)| {
                let is_default = registry.default.as_deref() == Some(name.as_str());
                (name.clone(), path.clone(), is_default)
            })
            .collect())
    }
}

/// Resolves the database the current invocation should use:
/// the override environment variable, then the nearest ancestor
/// database of the working directory, then the registered default,
/// then the default environment variable.
pub fn current_db_path(cwd: &Path, config: &ConfigHandle) -> Result<Option<(PathBuf, DbSource)>> {
    if let Some(path) = std::env::var_os(DB_PATH_OVERRIDE_VAR) {
        debug!("Database path overridden by {DB_PATH_OVERRIDE_VAR}");
        return Ok(Some((PathBuf::from(path), DbSource::Override)));
    }
    if let Some(root) = find_db_root(cwd) {
        return Ok(Some((root, DbSource::WorkingDir)));
    }
    if let Some(path) = config.get_default()? {
        return Ok(Some((path, DbSource::Registry)));
    }
    if let Some(path) = std::env::var_os(DEFAULT_DB_PATH_VAR) {
        return Ok(Some((PathBuf::from(path), DbSource::Environment)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn handle(tmp: &TempDir) -> ConfigHandle {
        ConfigHandle::new(tmp.path().join("conf").join("registry.json"))
    }

    #[test]
    fn test_register_get_unregister() {
        let tmp = TempDir::new().unwrap();
        let config = handle(&tmp);
        config.register("main", Path::new("/data/kmers")).unwrap();
        assert_eq!(config.get("main").unwrap(), PathBuf::from("/data/kmers"));
        assert!(matches!(
            config
                .get("other")
                .unwrap_err()
                .downcast::<KmerDbError>()
                .unwrap(),
            KmerDbError::DatabaseNotRegistered(_)
        ));
        config.unregister("main").unwrap();
        assert!(config.get("main").is_err());
    }

    #[test]
    fn test_default_requires_registration() {
        let tmp = TempDir::new().unwrap();
        let config = handle(&tmp);
        assert!(config.set_default("nope").is_err());
        config.register("a", Path::new("/a")).unwrap();
        config.set_default("a").unwrap();
        assert_eq!(config.get_default().unwrap(), Some(PathBuf::from("/a")));

        // Unregistering the default clears it.
        config.unregister("a").unwrap();
        assert_eq!(config.get_default().unwrap(), None);
    }

    #[test]
    fn test_list_marks_default() {
        let tmp = TempDir::new().unwrap();
        let config = handle(&tmp);
        config.register("a", Path::new("/a")).unwrap();
        config.register("b", Path::new("/b")).unwrap();
        config.set_default("b").unwrap();
        let entries = config.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|(n, _, d)| n == "b" && *d));
        assert!(entries.iter().any(|(n, _, d)| n == "a" && !*d));
    }

    #[test]
    fn test_current_db_prefers_ancestor_over_registry() {
        let tmp = TempDir::new().unwrap();
        let config = handle(&tmp);
        let db = crate::db::Database::create(&tmp.path().join("db"), false).unwrap();
        config.register("reg", Path::new("/elsewhere")).unwrap();
        config.set_default("reg").unwrap();

        let inside = db.directory().join("genomes");
        let (path, source) = current_db_path(&inside, &config).unwrap().unwrap();
        assert_eq!(path, db.directory());
        assert_eq!(source, DbSource::WorkingDir);

        let (path, source) = current_db_path(tmp.path(), &config).unwrap().unwrap();
        assert_eq!(path, PathBuf::from("/elsewhere"));
        assert_eq!(source, DbSource::Registry);
    }
}
