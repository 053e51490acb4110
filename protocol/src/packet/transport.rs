//! # Transport
//!
//! The seam between the transfer core and whatever carries packets to the
//! counterparty. The core only needs one call, [`Transport::send_packet`];
//! acknowledgements and timeouts come back as
//! [`LifecycleEvent`](super::LifecycleEvent)s.
//!
//! [`PacketOutbox`] is the in-memory implementation: it numbers packets per
//! channel, keeps a commitment per sequence until the packet is resolved,
//! and queues committed packets for a relayer to pick up.

use std::collections::{BTreeMap, HashMap, VecDeque};

use thiserror::Error;

use super::types::{OutboundPacket, Packet, Sequence};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("channel {port}/{channel} is closed")]
    ChannelClosed { port: String, channel: String },

    #[error("outbox full: {capacity} packets awaiting relay")]
    QueueFull { capacity: usize },

    #[error("packet encoding failed: {0}")]
    Encoding(String),
}

/// Hands packets to the counterparty.
pub trait Transport {
    /// Commits `packet` and returns the sequence it was assigned.
    fn send_packet(&mut self, packet: OutboundPacket) -> Result<Sequence, TransportError>;
}

type ChannelKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct PacketOutbox {
    next_sequence: HashMap<ChannelKey, Sequence>,
    commitments: BTreeMap<(ChannelKey, Sequence), String>,
    unrelayed: VecDeque<Packet>,
    closed: bool,
    capacity: Option<usize>,
}

impl PacketOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbox that refuses packets once `capacity` are waiting.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Stops accepting packets.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn reopen(&mut self) {
        self.closed = false;
    }

    /// Drains every packet waiting for relay, oldest first.
    pub fn take_unrelayed(&mut self) -> Vec<Packet> {
        self.unrelayed.drain(..).collect()
    }

    pub fn unrelayed_len(&self) -> usize {
        self.unrelayed.len()
    }

    pub fn commitment(&self, port: &str, channel: &str, sequence: Sequence) -> Option<&str> {
        self.commitments
            .get(&((port.to_string(), channel.to_string()), sequence))
            .map(String::as_str)
    }

    /// Drops the commitment of a resolved packet. A packet still waiting for
    /// relay is dropped with it, so it can never reach the counterparty.
    pub fn delete_commitment(&mut self, port: &str, channel: &str, sequence: Sequence) -> bool {
        self.unrelayed.retain(|packet| {
            !(packet.sequence == sequence
                && packet.source_port == port
                && packet.source_channel == channel)
        });
        self.commitments
            .remove(&((port.to_string(), channel.to_string()), sequence))
            .is_some()
    }

    /// Puts packets a relayer took but could not deliver back at the front
    /// of the queue, in their original order. Packets resolved in the
    /// meantime are discarded.
    pub fn requeue(&mut self, packets: Vec<Packet>) {
        for packet in packets.into_iter().rev() {
            let key = (
                (packet.source_port.clone(), packet.source_channel.clone()),
                packet.sequence,
            );
            if self.commitments.contains_key(&key) {
                self.unrelayed.push_front(packet);
            }
        }
    }

    pub fn commitment_count(&self) -> usize {
        self.commitments.len()
    }
}

impl Transport for PacketOutbox {
    fn send_packet(&mut self, packet: OutboundPacket) -> Result<Sequence, TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed {
                port: packet.source_port,
                channel: packet.source_channel,
            });
        }
        if let Some(capacity) = self.capacity {
            if self.unrelayed.len() >= capacity {
                return Err(TransportError::QueueFull { capacity });
            }
        }
        let commitment = packet
            .data
            .commitment()
            .map_err(|e| TransportError::Encoding(e.to_string()))?;

        let key = (packet.source_port.clone(), packet.source_channel.clone());
        let next = self.next_sequence.entry(key.clone()).or_insert(1);
        let sequence = *next;
        *next += 1;

        self.commitments.insert((key, sequence), commitment);
        self.unrelayed
            .push_back(Packet::from_outbound(sequence, packet));
        Ok(sequence)
    }
}
