//! Serve command - run the viewer until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::viewer::{CreateTabRequest, Viewer};

/// ID of the tab created from the `FILE` argument.
pub const INITIAL_TAB_ID: &str = "initial";

/// Arguments for the serve command.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    pub file: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub open: bool,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub no_watch: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, mut config: Settings) -> anyhow::Result<()> {
    if args.no_watch {
        config.watch.enabled = false;
    }
    if args.open {
        config.server.open_browser = true;
    }
    let bind = resolve_bind(&config.server.bind, args.bind.as_deref(), args.port);

    crate::logging::init_with_config(&config.logging);

    let viewer = Viewer::start(&config).context("failed to start file watcher")?;

    if let Some(file) = args.file {
        let request = initial_request(file, args.kind, args.title);
        let (tab, _) = viewer
            .create_from_request(request)
            .await
            .context("cannot open initial file")?;
        crate::log_event!("serve", "initial tab", "{} ({})", tab.title, tab.kind);
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("Shutting down...");
                signal_token.cancel();
            }
            Err(e) => tracing::error!("[serve] cannot listen for Ctrl+C: {e}"),
        }
    });

    let result = run_server(viewer.clone(), &bind, config.server.open_browser, shutdown).await;
    viewer.shutdown();
    result
}

fn initial_request(file: PathBuf, kind: Option<String>, title: Option<String>) -> CreateTabRequest {
    CreateTabRequest {
        id: Some(INITIAL_TAB_ID.to_string()),
        title: title.unwrap_or_default(),
        kind,
        file: Some(file),
        ..CreateTabRequest::default()
    }
}

/// `--bind` wins over the config; `--port` then replaces the port of whichever
/// address was chosen.
pub fn resolve_bind(configured: &str, bind: Option<&str>, port: Option<u16>) -> String {
    let base = bind.unwrap_or(configured);
    match port {
        Some(port) => {
            let host = base.rsplit_once(':').map_or(base, |(host, _)| host);
            format!("{host}:{port}")
        }
        None => base.to_string(),
    }
}

#[cfg(feature = "http-server")]
async fn run_server(
    viewer: Arc<Viewer>,
    bind: &str,
    open_browser: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;

    let addr = listener.local_addr()?;
    let host = if addr.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        addr.ip().to_string()
    };
    let url = format!("http://{host}:{}", addr.port());

    eprintln!("tabview listening on {url}");
    eprintln!("Press Ctrl+C to stop the server");

    if open_browser {
        if let Err(e) = open::that(&url) {
            tracing::warn!("[serve] cannot open browser: {e}");
        }
    }

    crate::server::serve_on(listener, viewer, shutdown).await
}

#[cfg(not(feature = "http-server"))]
async fn run_server(
    viewer: Arc<Viewer>,
    bind: &str,
    _open_browser: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    crate::server::serve(viewer, bind, shutdown).await
}
