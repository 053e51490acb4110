//! # In-Memory Relayer
//!
//! Moves committed packets between two [`Chain`]s in the same process and
//! carries the verdict back: an acknowledgement when the destination
//! received the packet, a timeout when it refused it as expired.
//!
//! The two halves, [`deliver`] and [`resolve`], are exposed separately so an
//! async relayer can lock one chain at a time.
//!
//! A packet the origin already resolved (say, timed out while the relayer
//! still held it) is never delivered. A pass that fails puts the packets it
//! has not finished back into the origin's outbox.

use serde::{Deserialize, Serialize};

use crate::chain::{Chain, ChainError};
use crate::ledger::BankKeeper;
use crate::packet::{Acknowledgement, Packet, PacketError, Resolution};

/// What the destination chain did with a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    Acknowledged(Acknowledgement),
    /// Refused as expired; the origin must time it out.
    Expired,
}

/// Counters for one relayer instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub packets_relayed: u64,
    pub acks_success: u64,
    pub acks_error: u64,
    pub timeouts: u64,
    pub duplicates: u64,
}

impl RelayStats {
    /// Counts one relayed packet by how it resolved.
    pub fn record(&mut self, delivery: &Delivery, resolution: &Resolution) {
        self.packets_relayed += 1;
        match resolution {
            Resolution::Duplicate { .. } => self.duplicates += 1,
            _ => match delivery {
                Delivery::Acknowledged(ack) if ack.is_success() => self.acks_success += 1,
                Delivery::Acknowledged(_) => self.acks_error += 1,
                Delivery::Expired => self.timeouts += 1,
            },
        }
    }

    /// Counts a packet skipped because its origin had already resolved it.
    pub fn record_settled(&mut self) {
        self.duplicates += 1;
    }
}

/// The origin's earlier resolution of `packet`, if there is one. Such a
/// packet must not be delivered: its escrow is already finalized or
/// refunded.
pub fn settled<B: BankKeeper>(origin: &Chain<B>, packet: &Packet) -> Option<Resolution> {
    origin
        .coordinator()
        .outcome(packet.sequence)
        .map(|outcome| Resolution::Duplicate {
            sequence: packet.sequence,
            outcome: outcome.clone(),
        })
}

/// Hands `packet` to `destination`.
pub fn deliver<B: BankKeeper>(
    destination: &mut Chain<B>,
    packet: &Packet,
) -> Result<Delivery, ChainError> {
    match destination.recv_packet(packet) {
        Ok(ack) => Ok(Delivery::Acknowledged(ack)),
        Err(ChainError::Packet(PacketError::Expired { .. })) => Ok(Delivery::Expired),
        Err(err) => Err(err),
    }
}

/// Reports the destination's verdict back to `origin`.
pub fn resolve<B: BankKeeper>(
    origin: &mut Chain<B>,
    packet: &Packet,
    delivery: Delivery,
) -> Result<Resolution, ChainError> {
    match delivery {
        Delivery::Acknowledged(ack) => origin.acknowledge_packet(packet.sequence, ack),
        Delivery::Expired => origin.timeout_packet(packet.sequence),
    }
}

/// Synchronous relayer between two chains.
#[derive(Debug, Clone, Default)]
pub struct Relayer {
    stats: RelayStats,
}

impl Relayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Relays everything `origin` has committed to `destination`.
    ///
    /// On error the failing packet and everything after it go back into
    /// the origin's outbox.
    pub fn relay<B: BankKeeper>(
        &mut self,
        origin: &mut Chain<B>,
        destination: &mut Chain<B>,
    ) -> Result<Vec<Resolution>, ChainError> {
        let packets = origin.take_outbound_packets();
        let mut resolutions = Vec::with_capacity(packets.len());
        for (index, packet) in packets.iter().enumerate() {
            match self.relay_one(origin, destination, packet) {
                Ok(resolution) => resolutions.push(resolution),
                Err(err) => {
                    origin.requeue_outbound_packets(packets[index..].to_vec());
                    return Err(err);
                }
            }
        }
        Ok(resolutions)
    }

    /// Relays a specific set of packets, e.g. ones held back by a test.
    pub fn relay_packets<B: BankKeeper>(
        &mut self,
        origin: &mut Chain<B>,
        destination: &mut Chain<B>,
        packets: &[Packet],
    ) -> Result<Vec<Resolution>, ChainError> {
        packets
            .iter()
            .map(|packet| self.relay_one(origin, destination, packet))
            .collect()
    }

    fn relay_one<B: BankKeeper>(
        &mut self,
        origin: &mut Chain<B>,
        destination: &mut Chain<B>,
        packet: &Packet,
    ) -> Result<Resolution, ChainError> {
        if let Some(resolution) = settled(origin, packet) {
            self.stats.record_settled();
            tracing::debug!(
                from = origin.chain_id(),
                sequence = packet.sequence,
                "packet already resolved at origin, not delivered"
            );
            return Ok(resolution);
        }
        let delivery = deliver(destination, packet)?;
        let resolution = resolve(origin, packet, delivery.clone())?;
        self.stats.record(&delivery, &resolution);
        tracing::debug!(
            from = origin.chain_id(),
            to = destination.chain_id(),
            sequence = packet.sequence,
            ?resolution,
            "packet relayed"
        );
        Ok(resolution)
    }

    /// Relays both directions until neither chain has anything queued.
    pub fn flush<B: BankKeeper>(
        &mut self,
        a: &mut Chain<B>,
        b: &mut Chain<B>,
    ) -> Result<usize, ChainError> {
        let mut relayed = 0;
        loop {
            let forward = self.relay(a, b)?.len();
            let backward = self.relay(b, a)?.len();
            if forward + backward == 0 {
                return Ok(relayed);
            }
            relayed += forward + backward;
        }
    }
}
