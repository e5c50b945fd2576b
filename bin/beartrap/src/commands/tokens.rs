use beartrap_core::Paths;
use beartrap_storage::SessionStore;

pub async fn list(json: bool) -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    let tokens = store.list_tokens();

    if json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
        return Ok(());
    }

    if tokens.is_empty() {
        println!("No token records. Run `beartrap fetch` first.");
        return Ok(());
    }

    println!("{:<32} {:<26} {:<10} {}", "account", "updated", "credits", "tier");
    for (key, record) in &tokens {
        let credits = record
            .credits
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "-".to_string());
        let tier = record.tier.as_deref().unwrap_or("-");
        println!(
            "{:<32} {:<26} {:<10} {}",
            key, record.updated_at, credits, tier
        );
    }
    Ok(())
}

pub async fn clear() -> anyhow::Result<()> {
    let store = SessionStore::new(Paths::new());
    store.clear_all()?;
    println!("Cleared all profiles and token records");
    Ok(())
}
