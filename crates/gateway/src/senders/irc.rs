//! IRC sender. Owns one client connection (first configured server) run
//! by a background task; `send` hands PRIVMSG lines to that task over an
//! mpsc channel and awaits a per-line acknowledgement. The task answers
//! server PINGs and redials with a fixed delay after a drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use aegis_domain::config::{IrcConfig, IrcServerConfig};
use aegis_domain::{ChannelKind, Error, OutputCommand, Result};

use crate::irc_wire;
use crate::processors::LifecycleGate;
use crate::senders::{limiter, ChannelSender, Limiter};

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

struct LineRequest {
    line: String,
    ack: oneshot::Sender<Result<()>>,
}

pub struct IrcSender {
    config: IrcConfig,
    gate: LifecycleGate,
    limiter: Limiter,
    tx: Mutex<Option<mpsc::Sender<LineRequest>>>,
    sent: AtomicU64,
    failures: AtomicU64,
}

impl IrcSender {
    pub fn new(config: IrcConfig) -> Self {
        let limiter = limiter(config.rate_per_sec, config.burst);
        Self {
            config,
            gate: LifecycleGate::new(),
            limiter,
            tx: Mutex::new(None),
            sent: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Connection owner: dial, register, then serve line requests while
    /// answering PINGs. Requests that arrive while disconnected fail
    /// fast so the retry layer can pace itself.
    async fn run_connection(
        server: IrcServerConfig,
        reconnect_delay: Duration,
        mut rx: mpsc::Receiver<LineRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let stream = match irc_wire::connect(&server).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(server = %server.host, error = %e, "irc sender connect failed");
                    // Fail requests quickly while the link is down.
                    Self::drain_failing(&mut rx, reconnect_delay, &cancel).await;
                    continue;
                }
            };

            let (read_half, mut write_half) = tokio::io::split(stream);
            if let Err(e) = irc_wire::register(&mut write_half, &server).await {
                tracing::warn!(server = %server.host, error = %e, "irc sender registration failed");
                Self::drain_failing(&mut rx, reconnect_delay, &cancel).await;
                continue;
            }
            tracing::info!(server = %server.host, "irc sender connected");

            let mut lines = BufReader::new(read_half).lines();
            let disconnect: Error = loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    request = rx.recv() => {
                        let Some(request) = request else { return };
                        let outcome = irc_wire::write_line(&mut write_half, &request.line).await;
                        let failed = outcome.is_err();
                        let _ = request.ack.send(outcome);
                        if failed {
                            break Error::Transport("irc write failed".into());
                        }
                    }
                    next = lines.next_line() => {
                        match next {
                            Ok(Some(raw)) => {
                                if let Some(line) = irc_wire::parse_line(&raw) {
                                    if line.command == "PING" {
                                        let token = line.trailing.unwrap_or_default();
                                        if irc_wire::write_line(&mut write_half, &format!("PONG :{token}")).await.is_err() {
                                            break Error::Transport("irc pong failed".into());
                                        }
                                    }
                                }
                            }
                            Ok(None) => break Error::Transport("irc connection closed".into()),
                            Err(e) => break Error::Transport(format!("irc read: {e}")),
                        }
                    }
                }
            };
            tracing::warn!(server = %server.host, error = %disconnect, "irc sender disconnected");

            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// While disconnected, answer pending requests with transport errors
    /// for one reconnect window instead of letting them hang.
    async fn drain_failing(
        rx: &mut mpsc::Receiver<LineRequest>,
        window: Duration,
        cancel: &CancellationToken,
    ) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => return,
                request = rx.recv() => {
                    let Some(request) = request else { return };
                    let _ = request.ack.send(Err(Error::Transport("irc link down".into())));
                }
            }
        }
    }
}

#[async_trait]
impl ChannelSender for IrcSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Irc
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.servers.is_empty()
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let child = self.gate.start(&cancel)?;
        let Some(server) = self.config.servers.first().cloned() else {
            return Ok(());
        };
        let (tx, rx) = mpsc::channel(32);
        *self.tx.lock() = Some(tx);
        tokio::spawn(Self::run_connection(
            server,
            Duration::from_secs(self.config.reconnect_delay_secs.max(1)),
            rx,
            child,
        ));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.gate.stop()?;
        *self.tx.lock() = None;
        Ok(())
    }

    async fn send(&self, command: &OutputCommand) -> Result<()> {
        if !self.gate.is_running() {
            return Err(Error::Internal("irc sender not running".into()));
        }
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| Error::Internal("irc sender has no connection task".into()))?;

        self.limiter.until_ready().await;

        // One PRIVMSG per line; strip line breaks so a multi-line payload
        // cannot smuggle extra IRC commands.
        let content = command.content.replace(['\r', '\n'], " ");
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(LineRequest {
            line: format!("PRIVMSG {} :{content}", command.target),
            ack: ack_tx,
        })
        .await
        .map_err(|_| Error::Transport("irc sender task gone".into()))?;

        let outcome = tokio::time::timeout(ACK_TIMEOUT, ack_rx)
            .await
            .map_err(|_| Error::Transport("irc send timed out".into()))?
            .map_err(|_| Error::Transport("irc send dropped".into()))?;

        match outcome {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.gate.state().to_string(),
            "sent": self.sent.load(Ordering::Relaxed),
            "failures": self.failures.load(Ordering::Relaxed),
            "servers": self.config.servers.len(),
        })
    }
}
