//! Interrupt handling for SIGINT and SIGTERM.
//!
//! A copy in progress cannot be resumed, so an interrupt ends the whole run;
//! the caller drops the run future, which kills any child rclone process.

use std::fmt;
use tokio::signal;
use tracing::{info, warn};

/// Which signal ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    CtrlC,
    Terminate,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::CtrlC => write!(f, "SIGINT"),
            Interrupt::Terminate => write!(f, "SIGTERM"),
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Resolve when the process is asked to stop.
pub async fn wait_for_interrupt() -> Interrupt {
    tokio::select! {
        _ = ctrl_c() => {
            info!("Received SIGINT (Ctrl+C)");
            Interrupt::CtrlC
        }
        _ = terminate() => {
            info!("Received SIGTERM");
            Interrupt::Terminate
        }
    }
}
