//! Token persistence with secure file permissions.
//!
//! Tokens are stored at `<config_dir>/tokens/<provider>.json` with 0600
//! file permissions. Writes go through a temporary file and a rename so a
//! crash never leaves a half-written token file behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use skald_plugin::{PluginError, TokenCache, TokenState};

use crate::types::StoredTokens;

/// Default token storage directory.
fn default_token_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skald")
        .join("tokens")
}

/// Token storage manager.
#[derive(Debug, Clone)]
pub struct TokenStore {
    /// Base directory for token files.
    base_dir: PathBuf,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self {
            base_dir: default_token_dir(),
        }
    }
}

impl TokenStore {
    /// Create a token store with the default directory (~/.skald/tokens/).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { base_dir: dir }
    }

    pub fn dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ensure the token directory exists with proper permissions.
    fn ensure_dir(&self) -> Result<(), PluginError> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&self.base_dir, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }

    fn token_path(&self, provider: &str) -> PathBuf {
        self.base_dir.join(format!("{provider}.json"))
    }

    /// Store tokens for a provider. File permissions are set to 0600.
    pub fn store_tokens(&self, tokens: &StoredTokens) -> Result<(), PluginError> {
        self.ensure_dir()?;

        let path = self.token_path(&tokens.provider);
        let json = serde_json::to_string_pretty(tokens)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        set_file_permissions_0600(&tmp_path)?;
        fs::rename(&tmp_path, &path)?;

        debug!(provider = %tokens.provider, path = %path.display(), "stored tokens");
        Ok(())
    }

    /// Load tokens for a provider.
    pub fn load_tokens(&self, provider: &str) -> Result<Option<StoredTokens>, PluginError> {
        let path = self.token_path(provider);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let tokens: StoredTokens = serde_json::from_str(&json)?;

        debug!(provider = %provider, "loaded tokens");
        Ok(Some(tokens))
    }

    /// Delete tokens for a provider. Returns whether a file was removed.
    pub fn delete_tokens(&self, provider: &str) -> Result<bool, PluginError> {
        let path = self.token_path(provider);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!(provider = %provider, "deleted tokens");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// [`TokenCache`] view of one provider's file in a [`TokenStore`].
#[derive(Debug, Clone)]
pub struct ProviderTokenCache {
    store: TokenStore,
    provider: String,
}

impl ProviderTokenCache {
    pub fn new(store: TokenStore, provider: impl Into<String>) -> Self {
        Self {
            store,
            provider: provider.into(),
        }
    }
}

impl TokenCache for ProviderTokenCache {
    fn load(&self) -> Result<Option<TokenState>, PluginError> {
        match self.store.load_tokens(&self.provider) {
            Ok(tokens) => Ok(tokens.map(StoredTokens::into_state)),
            Err(PluginError::Serialization(e)) => {
                warn!(provider = %self.provider, error = %e, "ignoring unreadable token file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, state: &TokenState) -> Result<(), PluginError> {
        match StoredTokens::from_state(&self.provider, state) {
            Some(tokens) => self.store.store_tokens(&tokens),
            None => self.clear(),
        }
    }

    fn clear(&self) -> Result<(), PluginError> {
        self.store.delete_tokens(&self.provider).map(|_| ())
    }
}

/// Set file permissions to 0600 (owner read/write only).
fn set_file_permissions_0600(path: &Path) -> Result<(), PluginError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(provider: &str) -> StoredTokens {
        StoredTokens {
            access_token: "access-123".to_string(),
            refresh_token: Some("refresh-456".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: Some(9_999_999_999),
            provider: provider.to_string(),
        }
    }

    #[test]
    fn store_and_load_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());

        store.store_tokens(&tokens("test")).unwrap();

        let loaded = store.load_tokens("test").unwrap().unwrap();
        assert_eq!(loaded, tokens("test"));
        assert!(!dir.path().join("test.json.tmp").exists());
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());
        assert!(store.load_tokens("nonexistent").unwrap().is_none());
    }

    #[test]
    fn delete_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());

        store.store_tokens(&tokens("test")).unwrap();
        assert!(store.delete_tokens("test").unwrap());
        assert!(!store.delete_tokens("test").unwrap());
    }

    #[test]
    fn store_creates_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().join("a").join("tokens"));
        store.store_tokens(&tokens("test")).unwrap();
        assert!(store.dir().join("test.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_has_0600_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());
        store.store_tokens(&tokens("perms_test")).unwrap();

        let metadata = fs::metadata(dir.path().join("perms_test.json")).unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }

    #[test]
    fn cache_round_trips_token_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());
        let cache = ProviderTokenCache::new(store, "spotify");
        assert!(cache.load().unwrap().is_none());

        let state = tokens("spotify").into_state();
        cache.store(&state).unwrap();
        assert_eq!(cache.load().unwrap(), Some(state));

        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn storing_empty_state_clears_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());
        store.store_tokens(&tokens("spotify")).unwrap();

        let cache = ProviderTokenCache::new(store.clone(), "spotify");
        cache.store(&TokenState::default()).unwrap();
        assert!(store.load_tokens("spotify").unwrap().is_none());
    }

    #[test]
    fn corrupt_token_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("spotify.json"), "{not json").unwrap();
        let store = TokenStore::with_dir(dir.path().to_path_buf());
        let cache = ProviderTokenCache::new(store, "spotify");
        assert!(cache.load().unwrap().is_none());
    }
}
