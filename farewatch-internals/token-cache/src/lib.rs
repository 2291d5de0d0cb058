//! Farewatch Token Cache
//! Copyright (c) 2026 Mamy Ratsimbazafy
//! Licensed and distributed under either of
//!   * MIT license (license terms at the root of the package or at http://opensource.org/licenses/MIT).
//!   * Apache v2 license (license terms at the root of the package or at http://www.apache.org/licenses/LICENSE-2.0).
//! at your option. This file may not be copied, modified, or distributed except according to those terms.

//! farewatch-internals/token-cache
//! Cross-run persistence for short-lived access tokens.
//!
//! A scheduled job starts every run with an empty process. When a cache is
//! wired in, the token holder reads it before authenticating and writes it
//! after every refresh, so a token issued by a previous run is reused until
//! it nears expiry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Custom error for token cache backends
#[derive(Debug, Error)]
pub enum TokenCacheError {
    #[error("token cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token cache at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token cache lock poisoned")]
    Poisoned,
}

/// A token as persisted between runs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// True when the token still has more than `margin` left at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

/// Storage backend for a single cached token.
///
/// Implementations must tolerate a missing entry (`Ok(None)`), which is the
/// normal state for the first run.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Result<Option<CachedToken>, TokenCacheError>;
    fn store(&self, token: &CachedToken) -> Result<(), TokenCacheError>;
    fn clear(&self) -> Result<(), TokenCacheError>;
}

/// JSON file backend.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a killed process never leaves a half-written token behind.
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TokenCacheError {
        TokenCacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, TokenCacheError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let token = serde_json::from_str(&contents).map_err(|source| TokenCacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(token))
    }

    fn store(&self, token: &CachedToken) -> Result<(), TokenCacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(token).map_err(|source| TokenCacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let staging = self.staging_path();
        fs::write(&staging, json).map_err(|e| self.io_error(e))?;

        // Bearer tokens are credentials: owner-only on unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), TokenCacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process backend, mostly useful in tests and for embedding.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CachedToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, TokenCacheError> {
        let slot = self.slot.lock().map_err(|_| TokenCacheError::Poisoned)?;
        Ok(slot.clone())
    }

    fn store(&self, token: &CachedToken) -> Result<(), TokenCacheError> {
        let mut slot = self.slot.lock().map_err(|_| TokenCacheError::Poisoned)?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenCacheError> {
        let mut slot = self.slot.lock().map_err(|_| TokenCacheError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token(minutes: i64) -> CachedToken {
        CachedToken::new("abc123", Utc::now() + Duration::minutes(minutes))
    }

    #[test]
    fn test_missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTokenCache::new(dir.path().join("token.json"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTokenCache::new(dir.path().join("nested/dir/token.json"));
        let token = sample_token(30);

        cache.store(&token).unwrap();
        assert_eq!(cache.load().unwrap(), Some(token));
        assert!(!cache.staging_path().exists(), "staging file should be renamed away");
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();

        let cache = FileTokenCache::new(&path);
        assert!(matches!(cache.load(), Err(TokenCacheError::Corrupt { .. })));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTokenCache::new(dir.path().join("token.json"));
        cache.store(&sample_token(30)).unwrap();

        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_freshness_respects_margin() {
        let now = Utc::now();
        let token = CachedToken::new("t", now + Duration::seconds(90));

        assert!(token.is_fresh_at(now, Duration::seconds(60)));
        assert!(!token.is_fresh_at(now, Duration::seconds(90)));
        assert!(!token.is_fresh_at(now + Duration::seconds(31), Duration::seconds(60)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", sample_token(5));
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = MemoryTokenCache::new();
        assert!(cache.load().unwrap().is_none());

        let token = sample_token(10);
        cache.store(&token).unwrap();
        assert_eq!(cache.load().unwrap(), Some(token));

        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }
}
