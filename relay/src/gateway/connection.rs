//! Gateway Connection Manager
//!
//! Keeps a gateway session alive with heartbeats and automatic reconnection,
//! and hands each member departure to the handler.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, Message};
use tracing::{debug, error, info, warn};

use super::error::GatewayError;
use super::events::{GatewayEvent, GatewayIntents, GatewayPayload};
use crate::handler::{MemberRemoved, MemberRemovedHandler};

/// Upper bound for reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Why a session stopped.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Gateway client that subscribes to member departures.
pub struct GatewayClient<H> {
    url: String,
    token: String,
    intents: GatewayIntents,
    handler: Arc<H>,
}

impl<H: MemberRemovedHandler> GatewayClient<H> {
    pub fn new(url: impl Into<String>, token: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents: GatewayIntents::RELAY,
            handler,
        }
    }

    #[must_use]
    pub const fn with_intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    /// Main connection loop with reconnection logic.
    ///
    /// Returns `Ok(())` once `shutdown_rx` fires (or its sender is dropped), or
    /// an error when the gateway closes with a code that rules out reconnecting.
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<(), GatewayError> {
        let mut attempt = 0u32;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Gateway shutdown requested");
                return Ok(());
            }

            info!(url = %self.url, "Connecting to gateway");

            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("Gateway connected");
                    attempt = 0;

                    match self.session(ws_stream, &mut shutdown_rx).await {
                        Ok(SessionEnd::Shutdown) => {
                            info!("Gateway session closed for shutdown");
                            return Ok(());
                        }
                        Ok(SessionEnd::Reconnect) => {}
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "Gateway rejected the session, not reconnecting");
                            return Err(e);
                        }
                        Err(e) => warn!(error = %e, "Gateway session failed"),
                    }
                }
                Err(e) => {
                    error!("Failed to connect to gateway: {}", e);
                }
            }

            attempt += 1;
            let backoff = std::cmp::min(Duration::from_secs(2u64.pow(attempt.min(5))), MAX_BACKOFF);
            info!("Reconnecting in {:?} (attempt {})", backoff, attempt);

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown during reconnect backoff");
                    return Ok(());
                }
            }
        }
    }

    /// Drive one connected session until it ends.
    async fn session<S>(
        &self,
        ws: S,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<SessionEnd, GatewayError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = ws.split();
        let mut sequence: Option<u64> = None;
        let mut heartbeat: Option<Interval> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                                Ok(p) => p,
                                Err(e) => {
                                    warn!("Failed to parse gateway frame: {}", e);
                                    continue;
                                }
                            };
                            if payload.s.is_some() {
                                sequence = payload.s;
                            }

                            let event = match GatewayEvent::from_payload(payload) {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!(error = %e, "Ignoring undecodable gateway event");
                                    continue;
                                }
                            };

                            match event {
                                GatewayEvent::Hello { heartbeat_interval_ms } => {
                                    heartbeat = Some(heartbeat_timer(heartbeat_interval_ms));
                                    send_payload(
                                        &mut write,
                                        &GatewayPayload::identify(&self.token, self.intents),
                                    )
                                    .await?;
                                    debug!(heartbeat_interval_ms, intents = self.intents.bits(), "Sent identify");
                                }
                                GatewayEvent::HeartbeatAck => awaiting_ack = false,
                                GatewayEvent::HeartbeatRequest => {
                                    send_payload(&mut write, &GatewayPayload::heartbeat(sequence)).await?;
                                }
                                GatewayEvent::Reconnect => {
                                    info!("Gateway requested reconnect");
                                    return Ok(SessionEnd::Reconnect);
                                }
                                GatewayEvent::InvalidSession { resumable } => {
                                    warn!(resumable, "Gateway invalidated the session");
                                    let pause = rand::thread_rng().gen_range(1000..=5000);
                                    tokio::time::sleep(Duration::from_millis(pause)).await;
                                    return Ok(SessionEnd::Reconnect);
                                }
                                GatewayEvent::Ready { user, session_id } => {
                                    info!(bot = %user.tag(), session_id = ?session_id, "Bot ready");
                                }
                                GatewayEvent::MemberRemoved(event) => self.dispatch(event),
                                GatewayEvent::BanAdded { guild_id, user } => {
                                    info!(
                                        user_id = %user.id,
                                        user = %user.tag(),
                                        guild_id = %guild_id,
                                        "Member banned"
                                    );
                                }
                                GatewayEvent::Other { name } => debug!(event = %name, "Ignoring dispatch"),
                                GatewayEvent::UnknownOpcode(op) => debug!(op, "Ignoring unknown opcode"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => return close_outcome(frame),
                        Some(Ok(_)) => {} // Binary/pong frames are not used with JSON encoding
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("Gateway stream ended");
                            return Ok(SessionEnd::Reconnect);
                        }
                    }
                }

                () = next_heartbeat(&mut heartbeat) => {
                    if awaiting_ack {
                        warn!("Heartbeat not acknowledged, reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    send_payload(&mut write, &GatewayPayload::heartbeat(sequence)).await?;
                    awaiting_ack = true;
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutdown received during gateway session");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    /// Run the handler for one departure on its own task.
    ///
    /// A panicking handler is logged and does not affect the session.
    fn dispatch(&self, event: MemberRemoved) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let user_id = event.user_id.clone();
            let handle = tokio::spawn(async move {
                handler.on_member_removed(event).await;
            });
            if let Err(e) = handle.await {
                error!(user_id = %user_id, "Member removal handler panicked: {}", e);
            }
        });
    }
}

/// Heartbeat interval whose first tick is jittered within one period.
fn heartbeat_timer(interval_ms: u64) -> Interval {
    let period = Duration::from_millis(interval_ms.max(1));
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let mut timer = tokio::time::interval_at(Instant::now() + period.mul_f64(jitter), period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Wait for the next heartbeat; pending forever before Hello.
async fn next_heartbeat(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn close_outcome(frame: Option<CloseFrame>) -> Result<SessionEnd, GatewayError> {
    let Some(frame) = frame else {
        info!("Gateway closed connection");
        return Ok(SessionEnd::Reconnect);
    };

    let code = u16::from(frame.code);
    let reason = frame.reason.as_str().to_owned();
    if GatewayError::is_fatal_close_code(code) {
        return Err(GatewayError::Closed { code, reason });
    }

    info!(code, reason = %reason, "Gateway closed connection");
    Ok(SessionEnd::Reconnect)
}

async fn send_payload<W>(write: &mut W, payload: &GatewayPayload) -> Result<(), GatewayError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(payload).map_err(GatewayError::Encode)?;
    write.send(Message::text(text)).await?;
    Ok(())
}
