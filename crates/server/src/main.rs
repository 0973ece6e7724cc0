// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use canopy::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    canopy::run::init_logging(&config);

    if let Err(e) = canopy::run::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
