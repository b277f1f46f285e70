use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::qos::QosLevel;
use crate::topic::TopicName;
use crate::{MqttPacket, PubRelPacket, PublishPacket};

/// Where a broker-originated QoS 1/2 PUBLISH sits in its acknowledgement
/// exchange.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutboundPhase {
    AwaitPubAck,
    AwaitPubRec,
    AwaitPubComp,
}

#[derive(Clone, Debug)]
pub struct OutboundInFlight {
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
    pub packet_id: u16,
    pub phase: OutboundPhase,
    pub last_send: Instant,
    pub retries: u8,
}

impl OutboundInFlight {
    fn retransmit_packet(&self) -> MqttPacket {
        match self.phase {
            OutboundPhase::AwaitPubAck | OutboundPhase::AwaitPubRec => {
                let mut packet =
                    PublishPacket::new(self.topic.clone(), self.payload.clone());
                match self.qos {
                    QosLevel::ExactlyOnce => packet.set_qos_exactly_once(self.packet_id),
                    _ => packet.set_qos_at_least_once(self.packet_id),
                }
                packet.set_retain(self.retain);
                packet.set_dup(true);
                return MqttPacket::Publish(packet);
            }
            OutboundPhase::AwaitPubComp => {
                return MqttPacket::PubRel(PubRelPacket::new(self.packet_id));
            }
        }
    }
}

pub enum RetransmitOutcome {
    Packets(Vec<MqttPacket>),
    /// Some entry ran out of retries; the session must close.
    Exhausted,
}

/// Broker-originated PUBLISHes still waiting on their acknowledgements.
#[derive(Debug, Default)]
pub struct OutboundTable {
    entries: HashMap<u16, OutboundInFlight>,
}

impl OutboundTable {
    pub fn new() -> Self {
        return Self {
            entries: HashMap::new(),
        };
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        return self.entries.contains_key(&packet_id);
    }

    /// Registers a freshly sent QoS 1/2 PUBLISH.
    pub fn track(
        &mut self,
        topic: TopicName,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
        packet_id: u16,
        now: Instant,
    ) {
        let phase = match qos {
            QosLevel::ExactlyOnce => OutboundPhase::AwaitPubRec,
            _ => OutboundPhase::AwaitPubAck,
        };

        self.entries.insert(
            packet_id,
            OutboundInFlight {
                topic,
                payload,
                qos,
                retain,
                packet_id,
                phase,
                last_send: now,
                retries: 0,
            },
        );
    }

    /// ## Returns false when the id is unknown or not awaiting a PUBACK.
    pub fn puback(&mut self, packet_id: u16) -> bool {
        match self.entries.get(&packet_id) {
            Some(entry) if entry.phase == OutboundPhase::AwaitPubAck => {
                self.entries.remove(&packet_id);
                return true;
            }
            _ => return false,
        }
    }

    /// Advances an exactly-once exchange past the PUBREC. The caller sends
    /// a PUBREL either way; the return value only signals whether the table
    /// actually moved.
    pub fn pubrec(&mut self, packet_id: u16, now: Instant) -> bool {
        match self.entries.get_mut(&packet_id) {
            Some(entry) if entry.phase == OutboundPhase::AwaitPubRec => {
                entry.phase = OutboundPhase::AwaitPubComp;
                entry.last_send = now;
                entry.retries = 0;
                return true;
            }
            _ => return false,
        }
    }

    /// ## Returns false when the id is unknown or not awaiting a PUBCOMP.
    pub fn pubcomp(&mut self, packet_id: u16) -> bool {
        match self.entries.get(&packet_id) {
            Some(entry) if entry.phase == OutboundPhase::AwaitPubComp => {
                self.entries.remove(&packet_id);
                return true;
            }
            _ => return false,
        }
    }

    /// One retransmission sweep. Every entry quiet for `timeout` either gets
    /// its phase packet re-sent (DUP set on PUBLISHes) or, past
    /// `max_retries`, condemns the whole session.
    pub fn retransmissions(
        &mut self,
        now: Instant,
        timeout: Duration,
        max_retries: u8,
    ) -> RetransmitOutcome {
        let mut packets = Vec::new();

        for entry in self.entries.values_mut() {
            if now.duration_since(entry.last_send) < timeout {
                continue;
            }

            if entry.retries >= max_retries {
                return RetransmitOutcome::Exhausted;
            }

            entry.retries += 1;
            entry.last_send = now;
            packets.push(entry.retransmit_packet());
        }

        return RetransmitOutcome::Packets(packets);
    }
}

/// A QoS 2 PUBLISH received from a client, acknowledged with PUBREC and
/// parked until its PUBREL arrives. Holding the message here is what makes
/// the exchange exactly-once: delivery happens on release, and a duplicate
/// PUBLISH meanwhile only re-triggers the PUBREC.
#[derive(Clone, Debug)]
pub struct InboundQos2 {
    pub topic: TopicName,
    pub payload: Bytes,
    pub retain: bool,
    pub packet_id: u16,
    pub last_send: Instant,
}

#[derive(Debug, Default)]
pub struct InboundQos2Table {
    entries: HashMap<u16, InboundQos2>,
}

impl InboundQos2Table {
    pub fn new() -> Self {
        return Self {
            entries: HashMap::new(),
        };
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        return self.entries.contains_key(&packet_id);
    }

    /// Stores an arriving QoS 2 PUBLISH. A retransmission (DUP set, id
    /// already parked) leaves the stored message untouched.
    pub fn observe(
        &mut self,
        topic: TopicName,
        payload: Bytes,
        retain: bool,
        packet_id: u16,
        dup: bool,
        now: Instant,
    ) {
        if dup && self.entries.contains_key(&packet_id) {
            return;
        }

        self.entries.insert(
            packet_id,
            InboundQos2 {
                topic,
                payload,
                retain,
                packet_id,
                last_send: now,
            },
        );
    }

    /// PUBREL arrived: hands the parked message back for delivery.
    pub fn release(&mut self, packet_id: u16) -> Option<InboundQos2> {
        return self.entries.remove(&packet_id);
    }

    /// Entries whose PUBREC has gone unanswered past `timeout`; their
    /// timers are re-stamped and the PUBREC is re-sent by the caller. The
    /// client owns this half of the exchange, so there is no retry ceiling.
    pub fn due_pubrecs(&mut self, now: Instant, timeout: Duration) -> Vec<u16> {
        let mut due = Vec::new();

        for entry in self.entries.values_mut() {
            if now.duration_since(entry.last_send) >= timeout {
                entry.last_send = now;
                due.push(entry.packet_id);
            }
        }

        return due;
    }
}
