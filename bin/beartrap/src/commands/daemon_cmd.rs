use anyhow::Context;
use beartrap_core::{Config, FetchOptions, Paths};
use beartrap_pipeline::sinks::HttpSubmitSink;
use beartrap_pipeline::{daemon, report, BrowserAcquirer, Orchestrator};
use beartrap_storage::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::fetch;

pub async fn run(
    interval_secs: u64,
    headless: bool,
    force_login: bool,
    submit: bool,
    docstore: bool,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    let store = Arc::new(SessionStore::new(paths.clone()));

    // Prerequisites checked once, before the first pass.
    if beartrap_browser::session::find_browser_binary().is_none() {
        anyhow::bail!("No Chrome/Chromium binary found; run `beartrap doctor`");
    }
    let doc_sink = if docstore {
        Some(Arc::new(fetch::connect_docstore(&config)?))
    } else {
        None
    };
    let submit_sink = if submit {
        let url = config
            .sinks
            .submit_url
            .clone()
            .context("sinks.submitUrl is not configured")?;
        Some(Arc::new(HttpSubmitSink::new(url)))
    } else {
        None
    };

    let opts = FetchOptions {
        headless,
        force_login,
    };
    let acquirer = Arc::new(BrowserAcquirer::new(paths, config));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), acquirer));

    let shutdown = fetch::spawn_ctrl_c_handler();
    let pass_shutdown = shutdown.clone();

    daemon::run_fixed_delay(
        Duration::from_secs(interval_secs),
        shutdown.subscribe(),
        move || {
            let store = store.clone();
            let orchestrator = orchestrator.clone();
            let doc_sink = doc_sink.clone();
            let submit_sink = submit_sink.clone();
            let shutdown = pass_shutdown.clone();
            async move {
                let emails = fetch::resolve_emails(&store, &[]);
                if emails.is_empty() {
                    warn!("No accounts stored; daemon pass is a no-op");
                    return;
                }
                let results = orchestrator
                    .run(&emails, opts, Some(shutdown.subscribe()))
                    .await;
                print!("{}", report::render_table(&results));

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
            }
        },
    )
    .await;

    Ok(())
}
