use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gnat_core::qos::QosLevel;
use gnat_core::topic::{TopicFilter, TopicName};
use gnat_core::Will;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::commands::{RouterToSessionCmd, SessionId, SessionToRouterCmd, StatusToRouterCmd};
use crate::config::BrokerConfig;

/// Ceiling on how long one backed-up session may stall the router. A
/// delivery that cannot be enqueued within this window is dropped.
const DELIVER_WAIT: Duration = Duration::from_millis(1000);

/// The single owner of everything sessions share: who is connected, who
/// subscribed to what, the retained store and the recent-message ring.
/// Sessions talk to it over commands, so none of this state ever needs a
/// lock.
pub struct Router {
    session_rx: mpsc::Receiver<SessionToRouterCmd>,
    status_rx: mpsc::Receiver<StatusToRouterCmd>,
    sessions: HashMap<SessionId, SessionEntry>,
    subscriptions: Vec<SubscriptionEntry>,
    retained: HashMap<TopicName, Bytes>,
    message_log: VecDeque<LogRecord>,
    log_capacity: usize,
    epoch: Instant,
    wifi_ssid: String,
    wifi_ip: String,
}

struct SessionEntry {
    client_id: String,
    sender: mpsc::Sender<RouterToSessionCmd>,
    last_seen_ms: Arc<AtomicU64>,
}

struct SubscriptionEntry {
    session: SessionId,
    filter: TopicFilter,
    granted_qos: QosLevel,
}

struct LogRecord {
    topic: TopicName,
    payload: Bytes,
    timestamp_ms: u64,
}

impl Router {
    pub fn new(
        session_rx: mpsc::Receiver<SessionToRouterCmd>,
        status_rx: mpsc::Receiver<StatusToRouterCmd>,
        config: &BrokerConfig,
        epoch: Instant,
    ) -> Self {
        return Self {
            session_rx,
            status_rx,
            sessions: HashMap::new(),
            subscriptions: Vec::new(),
            retained: HashMap::new(),
            message_log: VecDeque::new(),
            log_capacity: config.message_log_capacity(),
            epoch,
            wifi_ssid: config.ssid().to_owned(),
            wifi_ip: config.network_ip().to_owned(),
        };
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.session_rx.recv() => {
                    self.handle_session_cmd(cmd).await;
                }
                Some(cmd) = self.status_rx.recv() => {
                    self.handle_status_cmd(cmd);
                }
                else => break,
            }
        }
    }

    async fn handle_session_cmd(&mut self, cmd: SessionToRouterCmd) {
        match cmd {
            SessionToRouterCmd::Connected {
                id,
                client_id,
                sender,
                last_seen_ms,
            } => {
                log::info!("Client '{client_id}' connected as session {id}");
                self.sessions.insert(
                    id,
                    SessionEntry {
                        client_id,
                        sender,
                        last_seen_ms,
                    },
                );
            }
            SessionToRouterCmd::Publish {
                topic,
                payload,
                qos,
                retain,
            } => {
                self.publish(topic, payload, qos, retain).await;
            }
            SessionToRouterCmd::Subscribe { id, filters } => {
                self.subscribe(id, filters).await;
            }
            SessionToRouterCmd::Unsubscribe { id, filters } => {
                self.unsubscribe(id, &filters);
            }
            SessionToRouterCmd::Disconnected { id, will } => {
                self.disconnect(id, will).await;
            }
        }
    }

    fn handle_status_cmd(&mut self, cmd: StatusToRouterCmd) {
        match cmd {
            StatusToRouterCmd::Snapshot(resp_tx) => {
                if resp_tx.send(self.snapshot()).is_err() {
                    log::warn!("A status request was abandoned before the snapshot was built.");
                }
            }
        }
    }

    /// Routes one accepted message: retained-store update, message log,
    /// then a fan-out over the flat subscription index. Each matching entry
    /// gets its own copy at min(publisher QoS, granted QoS), so a client
    /// holding overlapping filters receives the message once per filter.
    async fn publish(&mut self, topic: TopicName, payload: Bytes, qos: QosLevel, retain: bool) {
        if retain {
            if payload.is_empty() {
                self.retained.remove(&topic);
            } else {
                self.retained.insert(topic.clone(), payload.clone());
            }
        }

        self.log_message(&topic, &payload);

        for entry in &self.subscriptions {
            if !entry.filter.matches(&topic) {
                continue;
            }

            let session = match self.sessions.get(&entry.session) {
                Some(session) => session,
                None => {
                    log::error!(
                        "Subscription index references dead session {}; this is a bug.",
                        entry.session
                    );
                    continue;
                }
            };

            let cmd = RouterToSessionCmd::Deliver {
                topic: topic.clone(),
                payload: payload.clone(),
                qos: qos.min(entry.granted_qos),
                retain: false,
            };

            deliver(&session.sender, entry.session, cmd).await;
        }
    }

    async fn subscribe(&mut self, id: SessionId, filters: Vec<(TopicFilter, QosLevel)>) {
        let session = match self.sessions.get(&id) {
            Some(session) => session,
            None => {
                log::warn!("SUBSCRIBE from unknown session {id}");
                return;
            }
        };

        for (filter, granted_qos) in filters {
            // replay every retained message the new filter matches, flagged
            // RETAIN and at the granted QoS
            for (topic, payload) in &self.retained {
                if !filter.matches(topic) {
                    continue;
                }

                let cmd = RouterToSessionCmd::Deliver {
                    topic: topic.clone(),
                    payload: payload.clone(),
                    qos: granted_qos,
                    retain: true,
                };

                deliver(&session.sender, id, cmd).await;
            }

            log::info!("Session {id} subscribed to '{filter}'");
            self.subscriptions.push(SubscriptionEntry {
                session: id,
                filter,
                granted_qos,
            });
        }
    }

    fn unsubscribe(&mut self, id: SessionId, filters: &[String]) {
        self.subscriptions.retain(|entry| {
            entry.session != id || !filters.iter().any(|filter| filter == entry.filter.as_str())
        });
    }

    /// Reaps a finished session: index entries go first so nothing can
    /// route to the dead id, then the registry entry, then the Will (which
    /// therefore never loops back to its own session).
    async fn disconnect(&mut self, id: SessionId, will: Option<Will>) {
        self.subscriptions.retain(|entry| entry.session != id);

        if let Some(entry) = self.sessions.remove(&id) {
            log::info!("Client '{}' disconnected (session {id})", entry.client_id);
        }

        if let Some(will) = will {
            log::info!("Publishing will for session {id} on '{}'", will.topic);
            self.publish(will.topic, will.payload, QosLevel::AtMostOnce, will.retain)
                .await;
        }
    }

    fn log_message(&mut self, topic: &TopicName, payload: &Bytes) {
        if self.message_log.len() == self.log_capacity {
            self.message_log.pop_front();
        }

        self.message_log.push_back(LogRecord {
            topic: topic.clone(),
            payload: payload.clone(),
            timestamp_ms: self.now_ms(),
        });
    }

    fn now_ms(&self) -> u64 {
        return self.epoch.elapsed().as_millis() as u64;
    }

    fn snapshot(&self) -> StatusSnapshot {
        let message_log = self
            .message_log
            .iter()
            .map(|record| LogEntry {
                topic: record.topic.to_string(),
                payload: String::from_utf8_lossy(&record.payload).into_owned(),
                timestamp: record.timestamp_ms,
            })
            .collect();

        let retained_messages = self
            .retained
            .iter()
            .map(|(topic, payload)| {
                (
                    topic.to_string(),
                    String::from_utf8_lossy(payload).into_owned(),
                )
            })
            .collect();

        let connected_clients = self
            .sessions
            .iter()
            .map(|(id, entry)| ClientStatus {
                id: entry.client_id.clone(),
                last_seen: entry.last_seen_ms.load(Ordering::Relaxed),
                subscribed_topics: self
                    .subscriptions
                    .iter()
                    .filter(|sub| sub.session == *id)
                    .map(|sub| sub.filter.as_str().to_owned())
                    .collect(),
            })
            .collect();

        return StatusSnapshot {
            message_log,
            retained_messages,
            connected_clients,
            wifi_ssid: self.wifi_ssid.clone(),
            wifi_ip: self.wifi_ip.clone(),
        };
    }
}

/// Hands a delivery to a session task without letting one backed-up client
/// wedge the router: past `DELIVER_WAIT` the packet is dropped.
async fn deliver(
    sender: &mpsc::Sender<RouterToSessionCmd>,
    id: SessionId,
    cmd: RouterToSessionCmd,
) {
    match sender.send_timeout(cmd, DELIVER_WAIT).await {
        Ok(()) => {}
        Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
            log::warn!("Session {id} is not draining deliveries; dropping one");
        }
        Err(mpsc::error::SendTimeoutError::Closed(_)) => {
            // the session task is already winding down; its Disconnected
            // command will prune the index shortly.
            log::debug!("Dropped a delivery to closing session {id}");
        }
    }
}

/// The `/mqtt_data` response body. Field names are part of the UI contract.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    #[serde(rename = "messageLog")]
    message_log: Vec<LogEntry>,
    #[serde(rename = "retainedMessages")]
    retained_messages: BTreeMap<String, String>,
    #[serde(rename = "connectedClients")]
    connected_clients: Vec<ClientStatus>,
    wifi_ssid: String,
    wifi_ip: String,
}

#[derive(Debug, Clone, Serialize)]
struct LogEntry {
    topic: String,
    payload: String,
    timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ClientStatus {
    id: String,
    #[serde(rename = "lastSeen")]
    last_seen: u64,
    #[serde(rename = "subscribedTopics")]
    subscribed_topics: Vec<String>,
}
