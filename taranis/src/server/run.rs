// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Signal handling of the running broker.

use super::ServerContext;
use crate::error::Error;

impl ServerContext {
    #[cfg(unix)]
    pub(super) async fn run_inner_loop(&mut self) -> Result<(), Error> {
        use tokio::signal::unix::{signal, SignalKind};

        log::info!("ServerContext::run_inner_loop()");
        let mut sigusr1_stream = signal(SignalKind::user_defined1())?;
        let mut sigterm_stream = signal(SignalKind::terminate())?;
        let mut sigquit_stream = signal(SignalKind::quit())?;
        let mut sigint_stream = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                Some(()) = sigusr1_stream.recv() => {
                    // TODO: propagate the reloaded config to running apps.
                    log::info!("Reload config");
                }
                Some(()) = sigterm_stream.recv() => {
                    log::info!("Quit with SIGTERM");
                    break;
                }
                Some(()) = sigquit_stream.recv() => {
                    log::info!("Quit with SIGQUIT");
                    break;
                }
                Some(()) = sigint_stream.recv() => {
                    log::info!("Quit with SIGINT");
                    break;
                }
            }
        }

        Ok(())
    }

    #[cfg(not(unix))]
    pub(super) async fn run_inner_loop(&mut self) -> Result<(), Error> {
        tokio::signal::ctrl_c().await?;
        log::info!("Quit with ctrl-c");
        Ok(())
    }
}
