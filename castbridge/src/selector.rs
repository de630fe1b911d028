//! Receiver selector coordination.
//!
//! The selector is an external program: it gets the current selector state
//! as one JSON argument, shows its UI, and prints one JSON selection result
//! on stdout. At most one invocation is live; opening a second one kills
//! the first, which then resolves as cancelled exactly once.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use castproto::{Outbound, SelectionResult};

use crate::config::SelectorConfig;

pub struct SelectorCoordinator {
    config: SelectorConfig,
    out: mpsc::UnboundedSender<Outbound>,
    /// Kill trigger of the live invocation. Stale after a natural exit;
    /// firing it then is harmless.
    current: Option<oneshot::Sender<()>>,
}

impl SelectorCoordinator {
    pub fn new(config: SelectorConfig, out: mpsc::UnboundedSender<Outbound>) -> Self {
        SelectorCoordinator {
            config,
            out,
            current: None,
        }
    }

    fn emit(&self, message: Outbound) {
        let _ = self.out.send(message);
    }

    /// Opens the selector with `data` as its JSON argument, replacing any
    /// live invocation.
    pub fn open(&mut self, data: String) {
        self.close();

        let Some(program) = self.config.program.clone() else {
            warn!("No receiver selector configured");
            self.emit(Outbound::SelectorError {
                message: "no receiver selector configured".to_string(),
            });
            self.emit(Outbound::SelectorCancelled);
            return;
        };

        info!("Opening receiver selector {}", program);
        let spawned = Command::new(&program)
            .args(&self.config.args)
            .arg(data)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to spawn receiver selector {}: {}", program, err);
                self.emit(Outbound::SelectorError {
                    message: format!("failed to spawn {program}: {err}"),
                });
                self.emit(Outbound::SelectorCancelled);
                return;
            }
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        self.current = Some(kill_tx);
        tokio::spawn(run_selector(child, kill_rx, self.out.clone()));
    }

    /// Kills the live invocation, if any; it resolves as cancelled.
    pub fn close(&mut self) {
        if let Some(kill) = self.current.take() {
            let _ = kill.send(());
        }
    }
}

async fn run_selector(
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    out: mpsc::UnboundedSender<Outbound>,
) {
    let emit = |message: Outbound| {
        let _ = out.send(message);
    };

    let mut stdout = child.stdout.take();
    let mut output = Vec::new();
    let read = async {
        if let Some(stdout) = stdout.as_mut() {
            let _ = stdout.read_to_end(&mut output).await;
        }
    };

    tokio::select! {
        _ = &mut kill => {
            debug!("Receiver selector superseded or closed, killing it");
            if let Err(err) = child.kill().await {
                warn!("Failed to kill receiver selector: {}", err);
            }
            emit(Outbound::SelectorCancelled);
            return;
        }
        _ = read => {}
    }

    let failure = match child.wait().await {
        Ok(status) if status.success() => {
            match serde_json::from_slice::<SelectionResult>(&output) {
                Ok(SelectionResult::Cast(cast)) => {
                    emit(Outbound::SelectorSelected(cast));
                    return;
                }
                Ok(SelectionResult::Stop(stop)) => {
                    emit(Outbound::SelectorStopped(stop));
                    return;
                }
                Ok(SelectionResult::Cancelled) => {
                    emit(Outbound::SelectorCancelled);
                    return;
                }
                Err(err) => format!("unparseable selector output: {err}"),
            }
        }
        Ok(status) => format!("selector exited with {status}"),
        Err(err) => format!("failed to reap selector: {err}"),
    };

    warn!("Receiver selector failed: {}", failure);
    emit(Outbound::SelectorError { message: failure });
    emit(Outbound::SelectorCancelled);
}
