use beartrap_core::{sanitize_email, Account, Paths};
use beartrap_storage::SessionStore;

pub async fn add(email: &str, password: Option<String>) -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    store.upsert_account(Account {
        email: email.to_string(),
        password,
    })?;
    println!("Stored account {}", sanitize_email(email));
    Ok(())
}

pub async fn remove(email: &str) -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    if store.remove_account(email)? {
        println!("Removed {} (profile, token record, list entry)", sanitize_email(email));
    } else {
        println!("Nothing stored for {}", sanitize_email(email));
    }
    Ok(())
}

pub async fn list() -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    let accounts = store.load_accounts();
    if accounts.is_empty() {
        println!("No accounts stored. Add one with `beartrap accounts add <email>`.");
        return Ok(());
    }

    let tokens = store.load_tokens();
    println!("{:<32} {:<10} {}", "account", "password", "token");
    for account in &accounts {
        let key = sanitize_email(&account.email);
        let has_password = if account.password.is_some() { "yes" } else { "-" };
        let has_token = if tokens.contains_key(&key) { "yes" } else { "-" };
        println!("{:<32} {:<10} {}", key, has_password, has_token);
    }
    Ok(())
}

pub async fn clear() -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    store.clear_all()?;
    store.save_accounts(&[])?;
    println!("Cleared all accounts, profiles, and token records");
    Ok(())
}
