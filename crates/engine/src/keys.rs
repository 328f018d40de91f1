//! Per-channel AES-128 segment keys.
//!
//! Each encrypted channel owns one 16-byte key, kept in memory for the life of
//! the process and mirrored to `{segment_root}/{slug}/key-file` so the
//! transcoder (and a key-serving frontend) can read it. Next to it sits
//! `enc.keyinfo`, the two-line key-info file the HLS muxer consumes:
//!
//! ```text
//! /stream/{slug}/key
//! {segment_root}/{slug}/key-file
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::channel::is_valid_slug;
use crate::error::IngestError;

pub const KEY_LEN: usize = 16;
pub const KEY_FILE_NAME: &str = "key-file";
pub const KEY_INFO_FILE_NAME: &str = "enc.keyinfo";
pub const DEFAULT_KEY_URI_PREFIX: &str = "/stream";

/// A channel's segment key. Never printed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChannelKey([u8; KEY_LEN]);

impl ChannelKey {
    fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChannelKey(<redacted>)")
    }
}

/// Thread-safe map from slug to key, backed by files under the segment root.
#[derive(Debug)]
pub struct KeyManager {
    segment_root: PathBuf,
    uri_prefix: String,
    keys: RwLock<HashMap<String, ChannelKey>>,
}

impl KeyManager {
    pub fn new(segment_root: impl Into<PathBuf>) -> Self {
        Self {
            segment_root: segment_root.into(),
            uri_prefix: DEFAULT_KEY_URI_PREFIX.to_string(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn key_path(&self, slug: &str) -> PathBuf {
        self.segment_root.join(slug).join(KEY_FILE_NAME)
    }

    pub fn key_info_path(&self, slug: &str) -> PathBuf {
        self.segment_root.join(slug).join(KEY_INFO_FILE_NAME)
    }

    /// URI players fetch the key from: `{prefix}/{slug}/key`
    pub fn key_uri(&self, slug: &str) -> String {
        format!("{}/{slug}/key", self.uri_prefix)
    }

    /// Return the channel's key, creating and persisting it on first use.
    ///
    /// Concurrent first calls for the same slug agree on a single key. A key
    /// file left by a previous run is reused when it holds exactly 16 bytes.
    pub fn get_current_key(&self, slug: &str) -> Result<ChannelKey, IngestError> {
        check_slug(slug)?;
        if let Some(key) = self.keys.read().get(slug) {
            return Ok(*key);
        }

        let mut keys = self.keys.write();
        if let Some(key) = keys.get(slug) {
            return Ok(*key);
        }

        let path = self.key_path(slug);
        let key = match load_key(&path) {
            Some(key) => {
                debug!(slug, "Reusing persisted segment key");
                key
            }
            None => {
                let key = ChannelKey::generate();
                write_atomic(&path, key.as_bytes(), true).map_err(|e| key_error(slug, e))?;
                info!(slug, "Generated segment key");
                key
            }
        };
        keys.insert(slug.to_string(), key);
        Ok(key)
    }

    /// Ensure the key exists and (re)write the channel's key-info file, returning its path.
    ///
    /// Called before every transcoder launch. The key file is what the
    /// transcoder encrypts with, so a file replaced by another process
    /// (`ingestd rotate-key`) is adopted here instead of the cached key.
    pub fn write_key_info(&self, slug: &str) -> Result<PathBuf, IngestError> {
        self.sync_key_file(slug)?;
        let key_path = self.key_path(slug);
        let info_path = self.key_info_path(slug);
        let contents = format!("{}\n{}\n", self.key_uri(slug), key_path.display());
        write_atomic(&info_path, contents.as_bytes(), false).map_err(|e| key_error(slug, e))?;
        Ok(info_path)
    }

    fn sync_key_file(&self, slug: &str) -> Result<ChannelKey, IngestError> {
        check_slug(slug)?;
        let path = self.key_path(slug);
        let mut keys = self.keys.write();
        let cached = keys.get(slug).copied();
        let key = match load_key(&path) {
            Some(on_disk) => {
                if cached.is_some_and(|key| key != on_disk) {
                    info!(slug, "Adopting segment key replaced on disk");
                }
                on_disk
            }
            None => {
                let key = cached.unwrap_or_else(ChannelKey::generate);
                write_atomic(&path, key.as_bytes(), true).map_err(|e| key_error(slug, e))?;
                key
            }
        };
        keys.insert(slug.to_string(), key);
        Ok(key)
    }

    /// Replace the channel's key. Segments written afterwards use the new key;
    /// the running transcoder keeps the old one until it is restarted.
    pub fn rotate_key(&self, slug: &str) -> Result<ChannelKey, IngestError> {
        check_slug(slug)?;
        let mut keys = self.keys.write();
        let key = ChannelKey::generate();
        write_atomic(&self.key_path(slug), key.as_bytes(), true).map_err(|e| key_error(slug, e))?;
        keys.insert(slug.to_string(), key);
        info!(slug, "Rotated segment key");
        Ok(key)
    }

    /// Drop the in-memory key. Files on disk are left alone.
    pub fn forget(&self, slug: &str) {
        self.keys.write().remove(slug);
    }
}

fn check_slug(slug: &str) -> Result<(), IngestError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(IngestError::invalid(slug, "not a valid slug"))
    }
}

fn key_error(slug: &str, err: std::io::Error) -> IngestError {
    IngestError::Key {
        slug: slug.to_string(),
        reason: err.to_string(),
    }
}

fn load_key(path: &Path) -> Option<ChannelKey> {
    let bytes = fs::read(path).ok()?;
    let key = ChannelKey::from_slice(&bytes);
    if key.is_none() {
        debug!(path = %path.display(), len = bytes.len(), "Ignoring malformed key file");
    }
    key
}

/// Write through a sibling temp file and rename, so readers never see a partial file.
fn write_atomic(path: &Path, contents: &[u8], private: bool) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent directory"))?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = dir.join(format!(".{file_name}.tmp"));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_same_slug_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let first = keys.get_current_key("news").unwrap();
        let second = keys.get_current_key("news").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_slugs_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let news = keys.get_current_key("news").unwrap();
        let sport = keys.get_current_key("sport").unwrap();
        assert_ne!(news, sport);
    }

    #[test]
    fn test_key_file_matches_returned_key() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let key = keys.get_current_key("news").unwrap();
        let on_disk = fs::read(dir.path().join("news").join(KEY_FILE_NAME)).unwrap();
        assert_eq!(on_disk.as_slice(), key.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());
        keys.get_current_key("news").unwrap();

        let mode = fs::metadata(keys.key_path("news")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_key_info_has_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let path = keys.write_key_info("news").unwrap();
        assert_eq!(path, dir.path().join("news").join(KEY_INFO_FILE_NAME));

        let contents = fs::read_to_string(&path).unwrap();
        let expected = format!(
            "/stream/news/key\n{}\n",
            dir.path().join("news").join(KEY_FILE_NAME).display()
        );
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_custom_uri_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path()).with_uri_prefix("/keys/");
        assert_eq!(keys.key_uri("news"), "/keys/news/key");
    }

    #[test]
    fn test_reloads_persisted_key() {
        let dir = tempfile::tempdir().unwrap();
        let original = KeyManager::new(dir.path()).get_current_key("news").unwrap();

        let restarted = KeyManager::new(dir.path());
        assert_eq!(restarted.get_current_key("news").unwrap(), original);
    }

    #[test]
    fn test_malformed_key_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("news")).unwrap();
        fs::write(dir.path().join("news").join(KEY_FILE_NAME), b"short").unwrap();

        let keys = KeyManager::new(dir.path());
        let key = keys.get_current_key("news").unwrap();
        let on_disk = fs::read(keys.key_path("news")).unwrap();
        assert_eq!(on_disk.as_slice(), key.as_bytes());
    }

    #[test]
    fn test_rotate_replaces_key() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let before = keys.get_current_key("news").unwrap();
        let after = keys.rotate_key("news").unwrap();
        assert_ne!(before, after);
        assert_eq!(keys.get_current_key("news").unwrap(), after);
    }

    #[test]
    fn test_key_info_adopts_key_rotated_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = KeyManager::new(dir.path());
        let before = daemon.get_current_key("news").unwrap();

        let rotated = KeyManager::new(dir.path()).rotate_key("news").unwrap();
        assert_eq!(daemon.get_current_key("news").unwrap(), before);

        daemon.write_key_info("news").unwrap();
        assert_eq!(daemon.get_current_key("news").unwrap(), rotated);
    }

    #[test]
    fn test_key_info_restores_deleted_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());
        let key = keys.get_current_key("news").unwrap();

        fs::remove_file(keys.key_path("news")).unwrap();
        keys.write_key_info("news").unwrap();
        assert_eq!(fs::read(keys.key_path("news")).unwrap().as_slice(), key.as_bytes());
    }

    #[test]
    fn test_concurrent_first_use_agrees() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(KeyManager::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = keys.clone();
                std::thread::spawn(move || keys.get_current_key("news").unwrap())
            })
            .collect();
        let results: Vec<ChannelKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_rejects_path_like_slug() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());
        assert!(keys.get_current_key("../escape").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let key = KeyManager::new(dir.path()).get_current_key("news").unwrap();
        assert_eq!(format!("{key:?}"), "ChannelKey(<redacted>)");
    }
}
