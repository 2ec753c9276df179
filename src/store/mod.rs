//! Flat-file user store.
//!
//! The canonical document is a pretty-printed JSON array of user records.
//! Every write also regenerates a browser-readable mirror that wraps the
//! same JSON in a `window.USER_DB = …;` assignment. Both files are written
//! via temp-file + rename so a reader never observes a partial document.
//!
//! Every mutation runs load-all → mutate → save-all under one process-wide
//! mutex, so exactly one mutation is in flight at a time and concurrent
//! writers cannot silently discard each other's snapshots.

use crate::auth;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Story id byte length before hex encoding (8 bytes = 16 hex chars).
/// Ids are unique per user only, never across users.
const STORY_ID_BYTES: usize = 8;

/// One generated story owned by a single user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: String,
    pub idea: String,
    pub genre: String,
    pub tone: String,
    /// Requested length tier, 1..=3.
    pub size: u8,
    pub story: String,
    pub favorite: bool,
}

/// A registered user and their story collection.
///
/// Field names mirror the on-disk document so existing store files keep
/// loading: `hash`, `alg` and `dklen` are the historical JSON keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Base64-encoded 16-byte salt.
    pub salt: String,
    /// Base64-encoded derived secret.
    #[serde(rename = "hash")]
    pub password_hash: String,
    pub iterations: u32,
    #[serde(rename = "alg")]
    pub algorithm: String,
    #[serde(rename = "dklen")]
    pub output_length: u32,
    #[serde(default)]
    pub stories: Vec<StoryRecord>,
}

impl UserRecord {
    /// Build a fresh record for `username` with a newly derived secret.
    pub fn with_password(username: &str, password: &str) -> Self {
        let salt = auth::generate_salt();
        let derived = auth::derive_hash(password, &salt, auth::PBKDF2_ITERATIONS);
        Self {
            username: username.to_string(),
            salt: BASE64.encode(salt),
            password_hash: BASE64.encode(derived),
            iterations: auth::PBKDF2_ITERATIONS,
            algorithm: auth::PBKDF2_ALGORITHM.to_string(),
            output_length: auth::HASH_BYTES as u32,
            stories: Vec::new(),
        }
    }

    /// Verify a password attempt against the stored salt, parameters and
    /// derived secret. Undecodable stored fields count as a mismatch.
    pub fn verify_password(&self, password: &str) -> bool {
        let Ok(salt) = BASE64.decode(&self.salt) else {
            return false;
        };
        let Ok(expected) = BASE64.decode(&self.password_hash) else {
            return false;
        };
        auth::verify_password(password, &salt, self.iterations, &expected)
    }
}

/// Generate a random hex story id.
pub fn new_story_id() -> String {
    let mut bytes = [0u8; STORY_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// JSON-file backed user store with a browser mirror.
pub struct UserStore {
    users_path: PathBuf,
    mirror_path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    pub fn new(users_path: impl Into<PathBuf>, mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            users_path: users_path.into(),
            mirror_path: mirror_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Seed an empty store + mirror if the canonical file does not exist.
    pub fn ensure_initialized(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.users_path.exists() {
            return Ok(());
        }
        self.save_all(&[])
    }

    /// Read the whole store. An absent file yields an empty store; a
    /// malformed file also yields an empty store but is logged loudly
    /// rather than silently swallowed.
    pub fn load_all(&self) -> Vec<UserRecord> {
        let raw = match fs::read_to_string(&self.users_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!(
                    path = %self.users_path.display(),
                    "Failed to read user store, treating as empty: {e}"
                );
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(
                    path = %self.users_path.display(),
                    "User store is malformed JSON, treating as empty — \
                     existing accounts will be lost on the next write: {e}"
                );
                Vec::new()
            }
        }
    }

    /// Serialize the full record list to the canonical document and
    /// regenerate the mirror with the identical JSON payload.
    pub fn save_all(&self, users: &[UserRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(users)?;
        write_atomic(&self.users_path, &json)
            .with_context(|| format!("writing {}", self.users_path.display()))?;
        write_atomic(&self.mirror_path, &format!("window.USER_DB = {json};"))
            .with_context(|| format!("writing {}", self.mirror_path.display()))?;
        Ok(())
    }

    /// Whether a username is taken, compared case-insensitively.
    pub fn username_taken(&self, username: &str) -> bool {
        let needle = username.to_lowercase();
        self.load_all()
            .iter()
            .any(|u| u.username.to_lowercase() == needle)
    }

    /// Find a user by case-insensitive username (login lookup).
    pub fn find_user(&self, username: &str) -> Option<UserRecord> {
        let needle = username.to_lowercase();
        self.load_all()
            .into_iter()
            .find(|u| u.username.to_lowercase() == needle)
    }

    /// Append a new user record, enforcing case-insensitive uniqueness.
    pub fn create_user(&self, record: UserRecord) -> Result<()> {
        self.mutate(|users| {
            let needle = record.username.to_lowercase();
            if users.iter().any(|u| u.username.to_lowercase() == needle) {
                bail!("Username '{}' is already taken", record.username);
            }
            users.push(record);
            Ok(())
        })
    }

    /// Stories of a user (exact username, as resolved from the session),
    /// in insertion order. Unknown users read as an empty collection.
    pub fn stories_for(&self, username: &str) -> Vec<StoryRecord> {
        self.load_all()
            .into_iter()
            .find(|u| u.username == username)
            .map(|u| u.stories)
            .unwrap_or_default()
    }

    /// Append a story to a user's collection and persist.
    pub fn append_story(&self, username: &str, story: StoryRecord) -> Result<()> {
        self.mutate(|users| {
            let Some(user) = users.iter_mut().find(|u| u.username == username) else {
                bail!("Unknown user '{username}'");
            };
            user.stories.push(story);
            Ok(())
        })
    }

    /// Toggle the favorite flag of one story. Returns the new flag value.
    pub fn toggle_favorite(&self, username: &str, story_id: &str) -> Result<bool> {
        self.mutate(|users| {
            let Some(user) = users.iter_mut().find(|u| u.username == username) else {
                bail!("Story not found");
            };
            let Some(story) = user.stories.iter_mut().find(|s| s.id == story_id) else {
                bail!("Story not found");
            };
            story.favorite = !story.favorite;
            Ok(story.favorite)
        })
    }

    /// Remove exactly one story by id, leaving the rest in order.
    pub fn delete_story(&self, username: &str, story_id: &str) -> Result<()> {
        self.mutate(|users| {
            let Some(user) = users.iter_mut().find(|u| u.username == username) else {
                bail!("Story not found");
            };
            if !user.stories.iter().any(|s| s.id == story_id) {
                bail!("Story not found");
            }
            user.stories.retain(|s| s.id != story_id);
            Ok(())
        })
    }

    /// Count registered users.
    pub fn user_count(&self) -> usize {
        self.load_all().len()
    }

    /// Run one load → mutate → save cycle under the store's write lock.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<UserRecord>) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let mut users = self.load_all();
        let out = f(&mut users)?;
        self.save_all(&users)?;
        Ok(out)
    }
}

/// Write `contents` to `path` via a temp file + rename in the same
/// directory, creating parent directories as needed.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, UserStore) {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(
            tmp.path().join("users.json"),
            tmp.path().join("static").join("users.js"),
        );
        (tmp, store)
    }

    fn story(id: &str) -> StoryRecord {
        StoryRecord {
            id: id.to_string(),
            idea: "a lost key".into(),
            genre: "mystery".into(),
            tone: "dark".into(),
            size: 2,
            story: "Once upon a time…".into(),
            favorite: false,
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_tmp, store) = test_store();
        assert!(store.load_all().is_empty());
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let (tmp, store) = test_store();
        fs::write(tmp.path().join("users.json"), "{not json").unwrap();
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn create_and_reload_user() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();

        let users = store.load_all();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].iterations, auth::PBKDF2_ITERATIONS);
        assert_eq!(users[0].algorithm, "sha256");
        assert!(users[0].stories.is_empty());
    }

    #[test]
    fn duplicate_username_rejected_case_insensitively() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("Alice", "secret1"))
            .unwrap();

        let result = store.create_user(UserRecord::with_password("alice", "other66"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already taken"));
        assert!(store.username_taken("ALICE"));
    }

    #[test]
    fn find_user_is_case_insensitive_and_keeps_stored_case() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("Alice", "secret1"))
            .unwrap();

        let found = store.find_user("aLiCe").unwrap();
        assert_eq!(found.username, "Alice");
        assert!(store.find_user("bob").is_none());
    }

    #[test]
    fn password_roundtrip_through_stored_record() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();

        let user = store.find_user("alice").unwrap();
        assert!(user.verify_password("secret1"));
        assert!(!user.verify_password("secret2"));
    }

    #[test]
    fn stored_parameters_are_honored_on_verify() {
        // A record derived under a non-default iteration count must still
        // verify using its own stored parameters.
        let salt = auth::generate_salt();
        let derived = auth::derive_hash("pass-word", &salt, 1_000);
        let record = UserRecord {
            username: "legacy".into(),
            salt: BASE64.encode(salt),
            password_hash: BASE64.encode(derived),
            iterations: 1_000,
            algorithm: "sha256".into(),
            output_length: 32,
            stories: Vec::new(),
        };
        assert!(record.verify_password("pass-word"));
        assert!(!record.verify_password("wrong"));
    }

    #[test]
    fn mirror_matches_canonical_document() {
        let (tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();

        let canonical = fs::read_to_string(tmp.path().join("users.json")).unwrap();
        let mirror = fs::read_to_string(tmp.path().join("static").join("users.js")).unwrap();
        assert_eq!(mirror, format!("window.USER_DB = {canonical};"));

        // No temp files left behind.
        assert!(!tmp.path().join("users.json.tmp").exists());
        assert!(!tmp.path().join("static").join("users.js.tmp").exists());
    }

    #[test]
    fn ensure_initialized_seeds_empty_store_once() {
        let (tmp, store) = test_store();
        store.ensure_initialized().unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("users.json")).unwrap(), "[]");

        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();
        store.ensure_initialized().unwrap();
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn append_story_preserves_insertion_order() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();
        for id in ["s1", "s2", "s3"] {
            store.append_story("alice", story(id)).unwrap();
        }

        let ids: Vec<String> = store
            .stories_for("alice")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["s1", "s2", "s3"]);
    }

    #[test]
    fn append_story_unknown_user_fails() {
        let (_tmp, store) = test_store();
        assert!(store.append_story("ghost", story("s1")).is_err());
    }

    #[test]
    fn toggle_favorite_twice_restores_original_flag() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();
        store.append_story("alice", story("s1")).unwrap();

        assert!(store.toggle_favorite("alice", "s1").unwrap());
        assert!(!store.toggle_favorite("alice", "s1").unwrap());
        assert!(!store.stories_for("alice")[0].favorite);
    }

    #[test]
    fn toggle_favorite_unknown_id_fails() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();

        let result = store.toggle_favorite("alice", "nope");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Story not found"));
    }

    #[test]
    fn delete_story_removes_only_the_target_and_keeps_order() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();
        for id in ["s1", "s2", "s3"] {
            store.append_story("alice", story(id)).unwrap();
        }

        store.delete_story("alice", "s2").unwrap();

        let ids: Vec<String> = store
            .stories_for("alice")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["s1", "s3"]);
    }

    #[test]
    fn delete_story_unknown_id_fails_and_changes_nothing() {
        let (_tmp, store) = test_store();
        store
            .create_user(UserRecord::with_password("alice", "secret1"))
            .unwrap();
        store.append_story("alice", story("s1")).unwrap();

        assert!(store.delete_story("alice", "nope").is_err());
        assert_eq!(store.stories_for("alice").len(), 1);
    }

    #[test]
    fn story_ids_are_sixteen_hex_chars_and_unique() {
        let id1 = new_story_id();
        let id2 = new_story_id();
        assert_eq!(id1.len(), 16);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }
}
