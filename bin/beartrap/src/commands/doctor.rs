use beartrap_browser::session::find_browser_binary;
use beartrap_core::{Config, Paths};

/// Run environment diagnostics.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("beartrap doctor: environment diagnostics");
    println!("========================================");
    println!();

    let mut err_count = 0u32;

    // Browser
    match find_browser_binary() {
        Some(path) => print_ok("Browser binary", &path),
        None => {
            print_err("Browser binary", "No Chrome/Chromium found on this system");
            err_count += 1;
        }
    }

    // Config
    let config_path = paths.config_file();
    if config_path.exists() {
        print_ok("Config file", &config_path.display().to_string());
    } else {
        print_warn("Config file", "Not found; defaults will be used");
    }
    let config = Config::load_or_default(&paths)?;
    println!("  Target: {}", config.target.url);
    println!("  API host pattern: {}", config.target.api_host);

    // Storage
    match paths.ensure_dirs() {
        Ok(()) => print_ok("Storage directory", &paths.base.display().to_string()),
        Err(e) => {
            print_err("Storage directory", &e.to_string());
            err_count += 1;
        }
    }

    let accounts = beartrap_storage::SessionStore::new(paths.clone()).load_accounts();
    println!("  Accounts stored: {}", accounts.len());

    // Sinks
    match &config.sinks.submit_url {
        Some(url) => print_ok("Submission sink", url),
        None => print_warn("Submission sink", "Not configured"),
    }
    match &config.sinks.docstore.credentials_file {
        Some(file) => {
            if std::path::Path::new(file).exists() {
                print_ok("Document-store credentials", file);
            } else {
                print_err("Document-store credentials", "Configured file does not exist");
                err_count += 1;
            }
        }
        None => print_warn("Document-store credentials", "Not configured"),
    }

    println!();
    if err_count == 0 {
        println!("All checks passed");
    } else {
        println!("{} check(s) failed", err_count);
    }
    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    println!("  ✓ {:<28} {}", label, detail);
}

fn print_warn(label: &str, detail: &str) {
    println!("  ~ {:<28} {}", label, detail);
}

fn print_err(label: &str, detail: &str) {
    println!("  ✗ {:<28} {}", label, detail);
}
