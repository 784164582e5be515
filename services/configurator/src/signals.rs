//! Termination signal handling.
//!
//! SIGINT, SIGTERM, SIGQUIT and SIGHUP sent to the configurator all mean
//! "stop". Handlers are installed before startup so none of these signals
//! falls through to the default disposition while the template is loading.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Installed handlers for the signals that stop the configurator.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
    hangup: Signal,
}

impl TerminationSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the first termination signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }

    /// Flip a shutdown flag when the first signal arrives.
    pub fn into_shutdown_channel(mut self) -> watch::Receiver<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let name = self.recv().await;
            info!(signal = name, "Received shutdown signal");
            let _ = shutdown_tx.send(true);
            // Keep the sender alive so the receiver sees `true`, not a closed channel.
            shutdown_tx.closed().await;
        });

        shutdown_rx
    }
}
