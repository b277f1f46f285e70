use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gnat_core::inflight::{InboundQos2Table, OutboundTable, RetransmitOutcome};
use gnat_core::io::{read_packet, read_packet_after};
use gnat_core::pid::PacketIdCounter;
use gnat_core::qos::QosLevel;
use gnat_core::topic::TopicName;
use gnat_core::{
    ConnAckPacket, ConnectReturnCode, MqttPacket, PingRespPacket, PubAckPacket, PubCompPacket,
    PubRecPacket, PubRelPacket, PublishPacket, SubAckPacket, SubscribePacket, UnsubAckPacket,
    UnsubscribePacket, Will,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::commands::{RouterToSessionCmd, SessionId, SessionToRouterCmd};

/// Once a frame's first byte has arrived, the rest must land within this
/// window; a peer that stalls longer is cut off.
const FRAME_WAIT: Duration = Duration::from_millis(1000);
/// Drives Keep-Alive enforcement and QoS retransmission.
const TICK_INTERVAL: Duration = Duration::from_millis(100);
const CHANNEL_CAPACITY: usize = 64;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum SessionState {
    AwaitConnect,
    Connected,
    Closed,
}

/// One connected client. The task owns the socket outright; everything it
/// shares with the rest of the broker flows through the router commands.
pub struct Session {
    id: SessionId,
    stream: TcpStream,
    router: mpsc::Sender<SessionToRouterCmd>,
    sender: mpsc::Sender<RouterToSessionCmd>,
    receiver: mpsc::Receiver<RouterToSessionCmd>,
    state: SessionState,
    client_id: String,
    keep_alive: Duration,
    last_seen: Instant,
    last_seen_ms: Arc<AtomicU64>,
    epoch: Instant,
    will: Option<Will>,
    outbound: OutboundTable,
    inbound_qos2: InboundQos2Table,
    pids: PacketIdCounter,
    qos_timeout: Duration,
    max_retries: u8,
}

impl Session {
    pub fn new(
        id: SessionId,
        stream: TcpStream,
        router: mpsc::Sender<SessionToRouterCmd>,
        qos_timeout: Duration,
        max_retries: u8,
        epoch: Instant,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        return Self {
            id,
            stream,
            router,
            sender,
            receiver,
            state: SessionState::AwaitConnect,
            client_id: String::new(),
            keep_alive: Duration::ZERO,
            last_seen: Instant::now(),
            last_seen_ms: Arc::new(AtomicU64::new(0)),
            epoch,
            will: None,
            outbound: OutboundTable::new(),
            inbound_qos2: InboundQos2Table::new(),
            pids: PacketIdCounter::new(),
            qos_timeout,
            max_retries,
        };
    }

    pub async fn run(mut self) {
        if !self.establish().await {
            return;
        }

        let mut ticker = interval(TICK_INTERVAL);

        while self.state == SessionState::Connected {
            tokio::select! {
                ready = self.stream.readable() => {
                    match ready {
                        Ok(()) => self.read_and_dispatch().await,
                        Err(err) => {
                            log::warn!("Session {}: transport error: {err}", self.id);
                            self.state = SessionState::Closed;
                        }
                    }
                }
                Some(cmd) = self.receiver.recv() => {
                    self.handle_router_cmd(cmd).await;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        // on a clean DISCONNECT the will has already been discarded
        let will = self.will.take();
        if let Err(err) = self
            .router
            .send(SessionToRouterCmd::Disconnected { id: self.id, will })
            .await
        {
            log::error!("Session {}: could not reach the router to disconnect: {err}", self.id);
        }
    }

    /// AwaitConnect: the one state where only a CONNECT is legal. Any other
    /// first packet, or a parse failure, closes the connection without a
    /// reply.
    async fn establish(&mut self) -> bool {
        let mut connect = match read_packet(&mut self.stream, FRAME_WAIT).await {
            Ok(Some(MqttPacket::Connect(packet))) => packet,
            Ok(Some(other)) => {
                log::warn!(
                    "Session {}: first packet was {}, not CONNECT",
                    self.id,
                    other.packet_type()
                );
                return false;
            }
            Ok(None) => return false,
            Err(err) => {
                log::warn!("Session {}: bad first packet: {err}", self.id);
                return false;
            }
        };

        if connect.level() != 4 {
            let connack = ConnAckPacket::new(false, ConnectReturnCode::InvalidProtocol);
            let _ = self.stream.write_all(&connack.encode()).await;
            return false;
        }

        // username/password are read off the wire and dropped; there is no
        // authentication policy in the broker itself
        self.client_id = connect.client_id().to_owned();
        self.keep_alive = Duration::from_secs(u64::from(connect.keep_alive()));
        self.will = connect.take_will();

        self.write(&ConnAckPacket::new(false, ConnectReturnCode::Accept).encode())
            .await;
        if self.state == SessionState::Closed {
            return false;
        }

        self.state = SessionState::Connected;
        self.touch();

        let registration = SessionToRouterCmd::Connected {
            id: self.id,
            client_id: self.client_id.clone(),
            sender: self.sender.clone(),
            last_seen_ms: self.last_seen_ms.clone(),
        };
        if self.router.send(registration).await.is_err() {
            log::error!("Session {}: the router is gone", self.id);
            return false;
        }

        return true;
    }

    /// Readiness fired: pull the first byte without blocking, then finish
    /// the frame under the bounded wait. A `WouldBlock` here is a spurious
    /// wakeup and simply hands control back to the select loop.
    async fn read_and_dispatch(&mut self) {
        let mut first = [0u8; 1];
        match self.stream.try_read(&mut first) {
            Ok(0) => {
                self.state = SessionState::Closed;
                return;
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => return,
            Err(err) => {
                log::warn!("Session {}: transport error: {err}", self.id);
                self.state = SessionState::Closed;
                return;
            }
        }

        match read_packet_after(&mut self.stream, first[0], FRAME_WAIT).await {
            Ok(packet) => {
                self.touch();
                self.handle_packet(packet).await;
            }
            Err(err) => {
                log::warn!(
                    "Session {}: malformed packet from '{}': {err}",
                    self.id,
                    self.client_id
                );
                self.state = SessionState::Closed;
            }
        }
    }

    async fn handle_packet(&mut self, packet: MqttPacket) {
        match packet {
            MqttPacket::Publish(publish) => self.handle_publish(publish).await,
            MqttPacket::PubAck(ack) => {
                if !self.outbound.puback(ack.id()) {
                    log::warn!(
                        "Session {}: unexpected PUBACK for packet id {}",
                        self.id,
                        ack.id()
                    );
                }
            }
            MqttPacket::PubRec(rec) => {
                if !self.outbound.pubrec(rec.id(), Instant::now()) {
                    log::warn!(
                        "Session {}: unexpected PUBREC for packet id {}",
                        self.id,
                        rec.id()
                    );
                }
                // answered either way; PUBREL is idempotent on the client
                self.write(&PubRelPacket::new(rec.id()).encode()).await;
            }
            MqttPacket::PubRel(rel) => {
                if let Some(parked) = self.inbound_qos2.release(rel.id()) {
                    self.forward(parked.topic, parked.payload, QosLevel::ExactlyOnce, parked.retain)
                        .await;
                }
                self.write(&PubCompPacket::new(rel.id()).encode()).await;
            }
            MqttPacket::PubComp(comp) => {
                if !self.outbound.pubcomp(comp.id()) {
                    log::warn!(
                        "Session {}: unexpected PUBCOMP for packet id {}",
                        self.id,
                        comp.id()
                    );
                }
            }
            MqttPacket::Subscribe(subscribe) => self.handle_subscribe(subscribe).await,
            MqttPacket::Unsubscribe(unsubscribe) => self.handle_unsubscribe(unsubscribe).await,
            MqttPacket::PingReq(_) => {
                self.write(&PingRespPacket::new().encode()).await;
            }
            MqttPacket::Disconnect(_) => {
                self.will = None;
                self.state = SessionState::Closed;
            }
            other => {
                log::warn!(
                    "Session {}: closing on unexpected {} packet",
                    self.id,
                    other.packet_type()
                );
                self.state = SessionState::Closed;
            }
        }
    }

    async fn handle_publish(&mut self, publish: PublishPacket) {
        let topic = publish.topic().clone();
        let payload = publish.payload().clone();

        match publish.qos() {
            QosLevel::AtMostOnce => {
                self.forward(topic, payload, QosLevel::AtMostOnce, publish.retain())
                    .await;
            }
            QosLevel::AtLeastOnce => {
                let id = match publish.id() {
                    Some(id) => id,
                    None => {
                        self.state = SessionState::Closed;
                        return;
                    }
                };
                self.forward(topic, payload, QosLevel::AtLeastOnce, publish.retain())
                    .await;
                self.write(&PubAckPacket::new(id).encode()).await;
            }
            QosLevel::ExactlyOnce => {
                let id = match publish.id() {
                    Some(id) => id,
                    None => {
                        self.state = SessionState::Closed;
                        return;
                    }
                };
                // parked until the PUBREL; a DUP retransmission of an id we
                // already hold must not overwrite the stored message
                self.inbound_qos2.observe(
                    topic,
                    payload,
                    publish.retain(),
                    id,
                    publish.dup(),
                    Instant::now(),
                );
                self.write(&PubRecPacket::new(id).encode()).await;
            }
        }
    }

    async fn handle_subscribe(&mut self, subscribe: SubscribePacket) {
        let mut granted = Vec::with_capacity(subscribe.requests().len());
        let mut filters = Vec::with_capacity(subscribe.requests().len());

        for request in subscribe.requests() {
            let qos = request.granted_qos();
            granted.push(qos);
            filters.push((request.filter().clone(), qos));
        }

        let cmd = SessionToRouterCmd::Subscribe {
            id: self.id,
            filters,
        };
        if self.router.send(cmd).await.is_err() {
            log::error!("Session {}: the router is gone", self.id);
            self.state = SessionState::Closed;
            return;
        }

        match SubAckPacket::new(subscribe.id(), granted).encode() {
            Ok(buf) => self.write(&buf).await,
            Err(err) => log::error!("Session {}: could not encode SUBACK: {err}", self.id),
        }
    }

    async fn handle_unsubscribe(&mut self, unsubscribe: UnsubscribePacket) {
        let cmd = SessionToRouterCmd::Unsubscribe {
            id: self.id,
            filters: unsubscribe.filters().to_vec(),
        };
        if self.router.send(cmd).await.is_err() {
            log::error!("Session {}: the router is gone", self.id);
            self.state = SessionState::Closed;
            return;
        }

        self.write(&UnsubAckPacket::new(unsubscribe.id()).encode())
            .await;
    }

    async fn handle_router_cmd(&mut self, cmd: RouterToSessionCmd) {
        match cmd {
            RouterToSessionCmd::Deliver {
                topic,
                payload,
                qos,
                retain,
            } => self.deliver(topic, payload, qos, retain).await,
        }
    }

    /// Writes a routed message out to this client. QoS 1/2 deliveries get a
    /// fresh packet id and join the outbound in-flight table for the
    /// retransmission tick.
    async fn deliver(&mut self, topic: TopicName, payload: Bytes, qos: QosLevel, retain: bool) {
        let mut packet = PublishPacket::new(topic.clone(), payload.clone());
        packet.set_retain(retain);

        if qos != QosLevel::AtMostOnce {
            let id = self.pids.next_id(|id| self.outbound.contains(id));
            match qos {
                QosLevel::ExactlyOnce => packet.set_qos_exactly_once(id),
                _ => packet.set_qos_at_least_once(id),
            }
            self.outbound
                .track(topic, payload, qos, retain, id, Instant::now());
        }

        match packet.encode() {
            Ok(buf) => self.write(&buf).await,
            Err(err) => log::error!("Session {}: could not encode PUBLISH: {err}", self.id),
        }
    }

    /// Keep-Alive enforcement and the QoS retransmission sweep.
    async fn tick(&mut self) {
        if self.keep_alive > Duration::ZERO && self.last_seen.elapsed() > self.keep_alive * 3 / 2 {
            log::info!(
                "Session {}: keep-alive expired for client '{}'",
                self.id,
                self.client_id
            );
            self.state = SessionState::Closed;
            return;
        }

        let now = Instant::now();

        match self
            .outbound
            .retransmissions(now, self.qos_timeout, self.max_retries)
        {
            RetransmitOutcome::Exhausted => {
                log::warn!(
                    "Session {}: retransmission budget exhausted for client '{}'",
                    self.id,
                    self.client_id
                );
                self.state = SessionState::Closed;
                return;
            }
            RetransmitOutcome::Packets(packets) => {
                for packet in packets {
                    match packet.encode() {
                        Ok(buf) => self.write(&buf).await,
                        Err(err) => {
                            log::error!("Session {}: could not encode retransmit: {err}", self.id)
                        }
                    }
                }
            }
        }

        for id in self.inbound_qos2.due_pubrecs(now, self.qos_timeout) {
            self.write(&PubRecPacket::new(id).encode()).await;
        }
    }

    async fn forward(&mut self, topic: TopicName, payload: Bytes, qos: QosLevel, retain: bool) {
        let cmd = SessionToRouterCmd::Publish {
            topic,
            payload,
            qos,
            retain,
        };
        if self.router.send(cmd).await.is_err() {
            log::error!("Session {}: the router is gone", self.id);
            self.state = SessionState::Closed;
        }
    }

    /// A write failure marks the session closed and drops the packet; the
    /// error never travels further than this task.
    async fn write(&mut self, bytes: &[u8]) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Err(err) = self.stream.write_all(bytes).await {
            log::warn!(
                "Session {}: write to closed transport, dropping packet: {err}",
                self.id
            );
            self.state = SessionState::Closed;
        }
    }

    fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.last_seen_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}
