use anyhow::{bail, Context};
use beartrap_browser::session::find_browser_binary;
use beartrap_core::{sanitize_email, Config, FetchOptions, Paths};
use beartrap_pipeline::sinks::{DocStoreClient, DocStoreSink, HttpSubmitSink};
use beartrap_pipeline::{report, BrowserAcquirer, Orchestrator};
use beartrap_storage::SessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct FetchArgs {
    pub emails: Vec<String>,
    pub headless: bool,
    pub force_login: bool,
    pub json: bool,
    pub submit: bool,
    pub docstore: bool,
}

pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    let store = Arc::new(SessionStore::new(paths.clone()));

    let emails = resolve_emails(&store, &args.emails);
    if emails.is_empty() {
        println!("No accounts to process. Add one with `beartrap accounts add <email>`.");
        return Ok(());
    }

    // Prerequisites fail before any account is touched.
    if find_browser_binary().is_none() {
        bail!("No Chrome/Chromium binary found; run `beartrap doctor`");
    }
    let doc_sink = if args.docstore {
        Some(connect_docstore(&config)?)
    } else {
        None
    };
    let submit_sink = if args.submit {
        let url = config
            .sinks
            .submit_url
            .clone()
            .context("sinks.submitUrl is not configured")?;
        Some(HttpSubmitSink::new(url))
    } else {
        None
    };

    let shutdown = spawn_ctrl_c_handler();

    let opts = FetchOptions {
        headless: args.headless,
        force_login: args.force_login,
    };
    let acquirer = Arc::new(BrowserAcquirer::new(paths, config));
    let orchestrator = Orchestrator::new(store, acquirer);

    info!(accounts = emails.len(), "Starting acquisition pass");
    let results = orchestrator
        .run(&emails, opts, Some(shutdown.subscribe()))
        .await;

    if args.json {
        println!("{}", report::render_json(&results)?);
    } else {
        print!("{}", report::render_table(&results));
    }

    // Sink faults past this point are logged, never fatal.
    if let Some(sink) = submit_sink {
        if let Err(e) = sink.submit(&results).await {
            warn!("Submission sink failed: {}", e);
        }
    }
    if let Some(sink) = doc_sink {
        if let Err(e) = sink.upsert_all(&results).await {
            warn!("Document-store sink failed: {}", e);
        }
    }

    Ok(())
}

/// Explicit emails when given, otherwise every stored account in list order.
pub fn resolve_emails(store: &SessionStore, explicit: &[String]) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.iter().map(|e| sanitize_email(e)).collect();
    }
    store
        .load_accounts()
        .iter()
        .map(|a| sanitize_email(&a.email))
        .collect()
}

pub fn connect_docstore(config: &Config) -> anyhow::Result<DocStoreSink> {
    let docstore = &config.sinks.docstore;
    let Some(base_url) = docstore.base_url.as_deref() else {
        bail!("sinks.docstore.baseUrl is not configured");
    };
    let Some(credentials) = docstore.credentials_file.as_deref() else {
        bail!("sinks.docstore.credentialsFile is not configured");
    };
    let client = DocStoreClient::connect(base_url, &PathBuf::from(credentials))
        .context("Document-store sink unavailable; aborting before processing accounts")?;
    Ok(DocStoreSink::new(client, docstore.collection.clone()))
}

/// Ctrl-C stops the pass at the next between-account check; an in-flight
/// session finishes (or fails) its current step first.
pub fn spawn_ctrl_c_handler() -> broadcast::Sender<()> {
    let (tx, _rx) = broadcast::channel(1);
    let tx_clone = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing current account");
            let _ = tx_clone.send(());
        }
    });
    tx
}
