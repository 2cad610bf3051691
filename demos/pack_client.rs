//! Syncs `./client_pack` against a running pack server.
//!
//! ```sh
//! cargo run --example pack_client --features "client"
//! ```

use std::sync::Arc;
use talon::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let dest = std::path::Path::new("./client_pack");
    std::fs::create_dir_all(dest)?;

    let config = ClientConfig {
        remote_url: "http://localhost:8443".into(),
        password: Some("demo-password".into()),
        ..Default::default()
    };
    let scheme = ConnectionScheme::for_client(&config, None, None)?;
    let client = SyncClient::new(config, scheme, None, dest, Arc::new(NullStatus))?;

    // The sync runs on its own task; this thread only waits for the single
    // boolean outcome.
    let outcome = client.start().wait().await;
    println!("sync succeeded: {}", outcome.success);

    if let Some(manifest) = outcome.manifest {
        println!("server pack contains:");
        for entry in &manifest.entries {
            println!("  {} -> {}", entry.group_id, entry.file_name);
        }
    }
    Ok(())
}
