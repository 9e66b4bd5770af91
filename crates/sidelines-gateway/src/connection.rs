use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sidelines_types::api::Claims;
use sidelines_types::events::{RealtimeCommand, RealtimeFrame};

use crate::feed::ChangeFeed;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Upper bound on concurrently open topics per socket.
const MAX_TOPICS: usize = 32;

/// Per-socket forwarders, keyed by client topic. Dropping the set aborts
/// every forwarder, which releases its feed subscription.
#[derive(Default)]
struct Topics {
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

impl Topics {
    fn len(&self) -> usize {
        self.forwarders.len()
    }

    fn contains(&self, topic: &Uuid) -> bool {
        self.forwarders.contains_key(topic)
    }

    fn insert(&mut self, topic: Uuid, task: JoinHandle<()>) {
        if let Some(previous) = self.forwarders.insert(topic, task) {
            previous.abort();
        }
    }

    fn remove(&mut self, topic: &Uuid) -> bool {
        match self.forwarders.remove(topic) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Topics {
    fn drop(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

/// Serve one realtime socket. Reads are public, so identifying is optional;
/// it only tags the connection in logs.
pub async fn handle_connection(socket: WebSocket, feed: ChangeFeed, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();
    info!("Realtime connection {} opened", conn_id);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RealtimeFrame>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = out_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Dropping unserializable frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let _ = out_tx.send(RealtimeFrame::Ready { user_id: None });

    // Read commands from client
    let recv_out = out_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        // Owned by this task, so aborting the task also stops the forwarders.
        let mut topics = Topics::default();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RealtimeCommand>(&text) {
                    Ok(cmd) => handle_command(conn_id, cmd, &feed, &jwt_secret, &recv_out, &mut topics),
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = recv_out.send(RealtimeFrame::Error {
                            topic: None,
                            message: "unrecognized command".into(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Realtime connection {} closed", conn_id);
}

fn handle_command(
    conn_id: Uuid,
    cmd: RealtimeCommand,
    feed: &ChangeFeed,
    jwt_secret: &str,
    out: &mpsc::UnboundedSender<RealtimeFrame>,
    topics: &mut Topics,
) {
    match cmd {
        RealtimeCommand::Identify { token } => {
            use jsonwebtoken::{DecodingKey, Validation, decode};

            match decode::<Claims>(&token, &DecodingKey::from_secret(jwt_secret.as_bytes()), &Validation::default()) {
                Ok(data) => {
                    info!("Connection {} identified as {}", conn_id, data.claims.sub);
                    let _ = out.send(RealtimeFrame::Ready { user_id: Some(data.claims.sub) });
                }
                Err(e) => {
                    warn!("Connection {} sent an invalid token: {}", conn_id, e);
                    let _ = out.send(RealtimeFrame::Error { topic: None, message: "invalid token".into() });
                }
            }
        }

        RealtimeCommand::Subscribe { topic, filter } => {
            if !topics.contains(&topic) && topics.len() >= MAX_TOPICS {
                let _ = out.send(RealtimeFrame::Error {
                    topic: Some(topic),
                    message: "too many subscriptions".into(),
                });
                return;
            }
            debug!("Connection {} subscribing topic {} to {:?}", conn_id, topic, filter);
            let mut sub = feed.subscribe(filter);
            let forward = out.clone();
            let task = tokio::spawn(async move {
                while let Some(event) = sub.recv().await {
                    if forward.send(RealtimeFrame::Change { topic, event }).is_err() {
                        break;
                    }
                }
            });
            topics.insert(topic, task);
            let _ = out.send(RealtimeFrame::Subscribed { topic });
        }

        RealtimeCommand::Unsubscribe { topic } => {
            if topics.remove(&topic) {
                debug!("Connection {} unsubscribed topic {}", conn_id, topic);
            }
            let _ = out.send(RealtimeFrame::Unsubscribed { topic });
        }
    }
}
