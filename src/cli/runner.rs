//! CLI execution runner.
//!
//! Drives one `LiveSession` per invocation and hands its views to the
//! output loop (and the view server with `--serve`).

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::{LiveSession, SessionHandle};

use super::bootstrap::CliContext;
use super::output::{print_view, run_view_loop};

/// Bootstrap from the snapshot, print the tree once and exit.
pub async fn run_once(ctx: &CliContext) -> Result<()> {
    let mut session = LiveSession::new(ctx.transport()?, ctx.session_config());
    session
        .bootstrap()
        .await
        .context("Failed to load snapshot")?;

    print_view(&session.view(), ctx.args.json)?;
    session.close();
    Ok(())
}

/// Connect, bootstrap and stream until the stream ends or Ctrl-C.
///
/// Every published view is printed as it arrives.
pub async fn run_live(ctx: &CliContext) -> Result<()> {
    let mut session = LiveSession::new(ctx.transport()?, ctx.session_config());
    let handle = session.handle();

    let json_mode = ctx.args.json;
    let views = handle.views();
    let output_handle: JoinHandle<Result<()>> =
        tokio::spawn(async move { run_view_loop(views, json_mode).await });
    let server = start_server_if_requested(ctx, &handle).await?;

    let result = tokio::select! {
        result = session.run() => result.context("Live session failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("[session] interrupted");
            Ok(())
        }
    };

    session.close();
    // Dropping the session ends the output loop after the last view
    drop(session);
    finish_output(output_handle).await;
    stop_server(server);

    result
}

/// Replay recorded stream records and print the final tree.
///
/// With `--serve` the server keeps running on the final state until Ctrl-C.
pub async fn run_replay(ctx: &CliContext) -> Result<()> {
    let mut session = LiveSession::new(ctx.transport()?, ctx.session_config());
    let handle = session.handle();
    let server = start_server_if_requested(ctx, &handle).await?;

    session.run().await.context("Replay failed")?;
    print_view(&session.view(), ctx.args.json)?;

    if server.is_some() {
        eprintln!("[cli] Replay finished, serving final state (Ctrl-C to exit)");
        tokio::signal::ctrl_c().await?;
    }

    session.close();
    stop_server(server);
    Ok(())
}

async fn finish_output(output_handle: JoinHandle<Result<()>>) {
    match output_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("Output handler error: {}", e);
        }
        Err(e) => {
            tracing::warn!("Output handler panicked: {}", e);
        }
    }
}

#[cfg(feature = "server")]
async fn start_server_if_requested(
    ctx: &CliContext,
    handle: &SessionHandle,
) -> Result<Option<CancellationToken>> {
    if !ctx.args.serve_enabled() {
        return Ok(None);
    }
    let (bind, port) = ctx.server_addr();
    let (addr, shutdown) = crate::server::start_server(&bind, port, handle.clone()).await?;
    eprintln!("[cli] Serving views on http://{}", addr);
    Ok(Some(shutdown))
}

#[cfg(not(feature = "server"))]
async fn start_server_if_requested(
    _ctx: &CliContext,
    _handle: &SessionHandle,
) -> Result<Option<CancellationToken>> {
    Ok(None)
}

fn stop_server(server: Option<CancellationToken>) {
    if let Some(shutdown) = server {
        shutdown.cancel();
    }
}
