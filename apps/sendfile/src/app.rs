//! Server and demo-client entry points.

use std::path::Path;

use anyhow::Context;

use sendfile_client::Client;
use sendfile_data_channel::{Address, Listener};
use sendfile_handle_store::HandleStore;
use sendfile_server::{Server, Service};

use crate::config::Config;

fn address(config: &Config) -> anyhow::Result<Address> {
    let raw = config
        .address
        .as_deref()
        .context("no address given; pass --address or set `address` in the config file")?;
    Ok(raw.parse()?)
}

/// Runs the responder until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let address = address(config)?;
    // Stale entries under the cache root are left alone.
    let store = HandleStore::open(&config.cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", config.cache_dir.display()))?;

    let listener = Listener::bind(&address).await?;
    let server = Server::new(Service::new(store, config.server_config()));

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            cancel.cancel();
        }
    });

    server.run(listener).await?;
    tracing::info!("server shut down cleanly");
    Ok(())
}

/// Sends `path`, then exercises stat and remove on a fresh connection.
pub async fn run_client(config: &Config, path: &Path) -> anyhow::Result<()> {
    let client = Client::new(address(config)?);

    let handle = client
        .send_file(path)
        .await
        .with_context(|| format!("sending {}", path.display()))?;
    println!("Got FileHandle: {handle}");

    // The transfer connection is consumed; control calls use a new one.
    let mut control = client.control().await?;

    let attrs = control.stat(&handle).await.context("LsFile failed")?;
    println!("Got FileAttributes: Size={}", attrs.size);

    control.remove(&handle).await.context("DeleteFile failed")?;
    println!("Removed {handle}");

    match control.remove(&handle).await {
        Err(e) if e.is_invalid_handle() => Ok(()),
        Err(e) => Err(e.into()),
        Ok(()) => anyhow::bail!("deleting a deleted file should not succeed"),
    }
}
