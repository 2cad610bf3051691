//! Serves the contents of `./pack_data` as a mod pack.
//!
//! ```sh
//! cargo run --example pack_server --features "server"
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;
use talon::prelude::*;

/// Classifies directory contents: `name-1.2.3.jar` files are grouped by
/// `name` so only the newest version ships, everything else is standalone.
fn scan(dir: &Path) -> anyhow::Result<Vec<CandidateFile>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == MANIFEST_FILE {
            continue;
        }
        match name
            .strip_suffix(".jar")
            .and_then(|stem| stem.rsplit_once('-'))
        {
            Some((group, version)) => {
                candidates.push(CandidateFile::grouped(&path, group, version));
            }
            None => candidates.push(CandidateFile::standalone(&path)),
        }
    }
    Ok(candidates)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let dir = Path::new("./pack_data");
    fs::create_dir_all(dir)?;

    let config = ServerConfig {
        password: Some("demo-password".into()),
        ..Default::default()
    };

    let files = ServerFileManager::initialize(dir, &config.excluded_group_ids, &scan(dir)?)?;
    let scheme = ConnectionScheme::for_server(&config, dir)?;

    let policy = AccessPolicy::new();
    let _watcher = PolicyWatcher::spawn(
        policy.clone(),
        dir.join("whitelist.json"),
        dir.join("server.properties"),
    )?;

    let state = AppState {
        files,
        scheme: Arc::new(scheme),
        policy,
    };

    println!("Pack server listening on http://0.0.0.0:{}", config.port);
    PackServer::new(config).run(state, None).await?;
    Ok(())
}
