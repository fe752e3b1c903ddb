//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core
//! services, so that no environment variables are read during request handling.

use crate::{HmisError, HmisResult};
use std::path::{Path, PathBuf};

/// Default database file when `HMIS_DB_PATH` is not set.
pub const DEFAULT_DB_PATH: &str = "hmis.sqlite3";

/// Per-entity-type cap on database-fallback search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    db_path: PathBuf,
    facility_name: String,
    search_limit: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `HmisError::InvalidInput` if the facility name is blank or the
    /// search limit is zero.
    pub fn new(db_path: PathBuf, facility_name: String, search_limit: usize) -> HmisResult<Self> {
        if facility_name.trim().is_empty() {
            return Err(HmisError::InvalidInput(
                "facility_name cannot be empty".into(),
            ));
        }
        if search_limit == 0 {
            return Err(HmisError::InvalidInput(
                "search_limit must be at least 1".into(),
            ));
        }
        Ok(Self {
            db_path,
            facility_name,
            search_limit,
        })
    }

    /// Resolve configuration from optional environment values already read by
    /// the caller (binaries read the environment once and pass values in).
    pub fn from_env_values(
        db_path: Option<String>,
        facility_name: Option<String>,
    ) -> HmisResult<Self> {
        Self::new(
            PathBuf::from(db_path.unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            facility_name.unwrap_or_else(|| "Neudebri Woundcare Hospital".into()),
            DEFAULT_SEARCH_LIMIT,
        )
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn facility_name(&self) -> &str {
        &self.facility_name
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_facility_name() {
        let err = CoreConfig::new(PathBuf::from("x.db"), "  ".into(), 10);
        assert!(err.is_err());
    }

    #[test]
    fn env_defaults_apply() {
        let cfg = CoreConfig::from_env_values(None, None).unwrap();
        assert_eq!(cfg.db_path(), Path::new(DEFAULT_DB_PATH));
        assert_eq!(cfg.search_limit(), DEFAULT_SEARCH_LIMIT);
    }
}
