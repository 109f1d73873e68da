// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Taranis daemon.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

use taranis::config::Config;
use taranis::error::{Error, ErrorKind};
use taranis::log::init_log;
use taranis::server::ServerContext;

const DEFAULT_CONFIG: &str = "/etc/taranis/taranis.toml";

#[derive(Debug, Parser)]
#[command(name = "taranis", version, about = "Distributed MQTT broker")]
struct Args {
    /// Path to the config file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only check the config file, then exit.
    #[arg(long)]
    test_config: bool,

    /// Tell a running broker to reload its config.
    #[arg(long)]
    reload: bool,

    /// Tell a running broker to shut down.
    #[arg(long)]
    stop: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Error> {
    let Some(path) = path
        .cloned()
        .or_else(|| PathBuf::from(DEFAULT_CONFIG).exists().then(|| PathBuf::from(DEFAULT_CONFIG)))
    else {
        // No config file at all runs with defaults.
        return Ok(Config::default());
    };
    let content = fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|err| {
        Error::from_string(
            ErrorKind::ConfigError,
            format!("Invalid config file {path:?}, err: {err}"),
        )
    })
}

fn main() -> Result<(), Error> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    if args.test_config {
        config.validate(false)?;
        println!("The configuration file is ok");
        return Ok(());
    }

    let mut server = ServerContext::new(config.clone());
    if args.reload {
        return server.send_reload_signal();
    }
    if args.stop {
        return server.send_stop_signal();
    }

    init_log(config.log())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    server.run_loop(&runtime)
}
