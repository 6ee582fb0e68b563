// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use clap::Parser;

use trace_http::{analysis, config, trace};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "trace-http")]
struct Args {
    /// Packet trace to analyze (JSONL, one packet per line)
    #[arg(long)]
    trace: String,

    /// Optional config TOML path
    #[arg(long)]
    config: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    report: Option<String>,
}

async fn load_config(path: Option<&str>) -> config::Config {
    match path {
        Some(p) => config::Config::load_from_path(p).await.unwrap_or_else(|e| {
            warn!(%p, %e, "failed to load config, using defaults");
            config::Config::default()
        }),
        None => config::Config::default(),
    }
}

async fn run(args: Args) -> anyhow::Result<String> {
    let cfg = load_config(args.config.as_deref()).await;
    let packets = trace::load_packets(&args.trace).await?;
    info!(packets = packets.len(), trace = %args.trace, "trace loaded");

    let result = analysis::analyze(&mut packets.into_iter(), &cfg);
    let json = serde_json::to_string_pretty(&result.summary())?;

    match args.report.or(cfg.general.report) {
        Some(path) => {
            tokio::fs::write(&path, json.as_bytes()).await?;
            info!(%path, "report written");
        }
        None => println!("{}", json),
    }
    Ok(json)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();
    run(args).await?;
    Ok(())
}
