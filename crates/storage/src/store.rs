//! Durable per-account state: the ordered account list, the token map, and
//! the browser profile directories.
//!
//! Reads never fail: a missing or malformed file is treated as the empty
//! structure so a half-written or hand-edited file degrades instead of
//! aborting a run. Writes are whole-file, last-write-wins; callers that
//! share a storage location across processes must serialize themselves.

use beartrap_core::{sanitize_email, Account, Paths, Result, TokenRecord};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

pub type TokenMap = BTreeMap<String, TokenRecord>;

pub struct SessionStore {
    paths: Paths,
}

impl SessionStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    // ── Account list ────────────────────────────────────────────────────

    pub fn load_accounts(&self) -> Vec<Account> {
        let path = self.paths.accounts_file();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!(error = %e, path = %path.display(), "Unreadable account list, starting empty");
                Vec::new()
            }
        }
    }

    pub fn save_accounts(&self, accounts: &[Account]) -> Result<()> {
        self.paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(accounts)?;
        fs::write(self.paths.accounts_file(), content)?;
        Ok(())
    }

    /// Add or replace the list entry for this address (keyed sanitized).
    pub fn upsert_account(&self, account: Account) -> Result<()> {
        let key = sanitize_email(&account.email);
        let mut accounts = self.load_accounts();
        if let Some(existing) = accounts
            .iter_mut()
            .find(|a| sanitize_email(&a.email) == key)
        {
            *existing = account;
        } else {
            accounts.push(account);
        }
        self.save_accounts(&accounts)
    }

    /// Stored password lookup, sanitized-key matching.
    pub fn find_password(&self, email: &str) -> Option<String> {
        let key = sanitize_email(email);
        self.load_accounts()
            .into_iter()
            .find(|a| sanitize_email(&a.email) == key)
            .and_then(|a| a.password)
    }

    // ── Token map ───────────────────────────────────────────────────────

    pub fn load_tokens(&self) -> TokenMap {
        let path = self.paths.tokens_file();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return TokenMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                debug!(error = %e, path = %path.display(), "Unreadable token map, starting empty");
                TokenMap::new()
            }
        }
    }

    pub fn save_tokens(&self, tokens: &TokenMap) -> Result<()> {
        self.paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(tokens)?;
        fs::write(self.paths.tokens_file(), content)?;
        Ok(())
    }

    /// Whole-record overwrite for one sanitized key. Never merges fields.
    pub fn upsert_token(&self, email: &str, record: TokenRecord) -> Result<()> {
        let mut tokens = self.load_tokens();
        tokens.insert(sanitize_email(email), record);
        self.save_tokens(&tokens)
    }

    pub fn list_tokens(&self) -> TokenMap {
        self.load_tokens()
    }

    // ── Combined removal ────────────────────────────────────────────────

    /// Drop one account everywhere: profile directory, token-map entry, and
    /// account-list entry. Returns whether anything existed.
    pub fn remove_account(&self, email: &str) -> Result<bool> {
        let key = sanitize_email(email);
        let mut removed = false;

        let profile = self.paths.profile_dir(&key);
        if profile.exists() {
            fs::remove_dir_all(&profile)?;
            removed = true;
        }

        let mut tokens = self.load_tokens();
        if tokens.remove(&key).is_some() {
            self.save_tokens(&tokens)?;
            removed = true;
        }

        let mut accounts = self.load_accounts();
        let before = accounts.len();
        accounts.retain(|a| sanitize_email(&a.email) != key);
        if accounts.len() != before {
            self.save_accounts(&accounts)?;
            removed = true;
        }

        Ok(removed)
    }

    /// Wipe every profile directory and the entire token map.
    pub fn clear_all(&self) -> Result<()> {
        let profiles = self.paths.profiles_dir();
        if profiles.exists() {
            fs::remove_dir_all(&profiles)?;
        }
        self.save_tokens(&TokenMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (SessionStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(Paths::with_base(dir.path().to_path_buf()));
        (store, dir)
    }

    #[test]
    fn test_missing_files_read_empty() {
        let (store, _dir) = test_store();
        assert!(store.load_accounts().is_empty());
        assert!(store.load_tokens().is_empty());
    }

    #[test]
    fn test_corrupt_files_read_empty() {
        let (store, _dir) = test_store();
        store.paths().ensure_dirs().unwrap();
        fs::write(store.paths().accounts_file(), "{not json").unwrap();
        fs::write(store.paths().tokens_file(), "[wrong shape]").unwrap();
        assert!(store.load_accounts().is_empty());
        assert!(store.load_tokens().is_empty());
    }

    #[test]
    fn test_upsert_token_is_idempotent_per_key() {
        let (store, _dir) = test_store();
        store
            .upsert_token("a@x.com", TokenRecord {
                token: "T1".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
                credits: None,
                tier: None,
            })
            .unwrap();
        store
            .upsert_token("a@x.com", TokenRecord {
                token: "T2".to_string(),
                updated_at: "2026-01-02T00:00:00Z".to_string(),
                credits: Some(5.0),
                tier: None,
            })
            .unwrap();

        let tokens = store.list_tokens();
        assert_eq!(tokens.len(), 1);
        let record = &tokens["a@x.com"];
        assert_eq!(record.token, "T2");
        assert_eq!(record.updated_at, "2026-01-02T00:00:00Z");
    }

    #[test]
    fn test_sanitized_variants_share_one_key() {
        let (store, _dir) = test_store();
        store
            .upsert_token("User@Example.com", TokenRecord::new("T1"))
            .unwrap();
        store
            .upsert_token("user@example.com ", TokenRecord::new("T2"))
            .unwrap();

        let tokens = store.list_tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens["user@example.com"].token, "T2");
    }

    #[test]
    fn test_remove_account_drops_profile_and_record() {
        let (store, _dir) = test_store();
        let key = "a@x.com";
        store
            .upsert_account(Account {
                email: key.to_string(),
                password: Some("p".to_string()),
            })
            .unwrap();
        store.upsert_token(key, TokenRecord::new("T1")).unwrap();
        let profile = store.paths().profile_dir(key);
        fs::create_dir_all(&profile).unwrap();

        assert!(store.remove_account(key).unwrap());

        assert!(!profile.exists());
        assert!(!store.list_tokens().contains_key(key));
        assert!(store.load_accounts().is_empty());
        // A second removal finds nothing left.
        assert!(!store.remove_account(key).unwrap());
    }

    #[test]
    fn test_clear_all() {
        let (store, _dir) = test_store();
        store.upsert_token("a@x.com", TokenRecord::new("T1")).unwrap();
        store.upsert_token("b@x.com", TokenRecord::new("T2")).unwrap();
        fs::create_dir_all(store.paths().profile_dir("a@x.com")).unwrap();

        store.clear_all().unwrap();

        assert!(store.list_tokens().is_empty());
        assert!(!store.paths().profile_dir("a@x.com").exists());
    }

    #[test]
    fn test_find_password_sanitized_lookup() {
        let (store, _dir) = test_store();
        store
            .upsert_account(Account {
                email: "User@Example.com".to_string(),
                password: Some("hunter2".to_string()),
            })
            .unwrap();
        assert_eq!(
            store.find_password("user@example.com "),
            Some("hunter2".to_string())
        );
        assert_eq!(store.find_password("other@example.com"), None);
    }
}
