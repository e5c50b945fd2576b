use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".beartrap"))
            .unwrap_or_else(|| PathBuf::from(".beartrap"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.base.join("accounts.json")
    }

    pub fn tokens_file(&self) -> PathBuf {
        self.base.join("tokens.json")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    /// Browser user-data directory for one account key. The key is already a
    /// sanitized email; separators that would escape the profiles dir are
    /// replaced the same way session keys are made file-safe.
    pub fn profile_dir(&self, account_key: &str) -> PathBuf {
        let safe_key = account_key.replace([':', '/', '\\'], "_");
        self.profiles_dir().join(safe_key)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profiles_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
