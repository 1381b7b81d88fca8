//! Items Service
//!
//! # Usage
//!
//! ```bash
//! cargo run --package items-service -- --port 8080
//! curl -u keel:password -H 'content-type: application/json' \
//!      -d '{"title":"lamp","price":30}' http://localhost:8080/items
//! curl 'http://localhost:8080/ping?x=1&y=2'
//! ```

use std::path::PathBuf;

use anyhow::{Result, ensure};
use clap::Parser;
use keel::transport::WebServerModule;

#[derive(Debug, Parser)]
#[command(about = "A small item catalogue served over HTTP")]
struct Args {
    /// Configuration file, instead of keel.toml in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, ...).
    #[arg(long)]
    profile: Option<String>,

    /// Port of the HTTP server, overriding configuration.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = items_service::service().set("modules.web-server.active", true);
    if let Some(port) = args.port {
        builder = builder.set("modules.web-server.port", port);
    }
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }

    let runtime = builder.build()?;
    ensure!(
        runtime.server(WebServerModule::NAME).is_some(),
        "no '{}' server module was loaded",
        WebServerModule::NAME
    );

    runtime.run().await?;
    Ok(())
}
