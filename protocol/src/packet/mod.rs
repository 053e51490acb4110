//! # Cross-Chain Packets
//!
//! Everything between "the gate admitted an outbound transfer" and "the
//! origin chain knows how it ended":
//!
//! - [`types`]: packet payload, acknowledgement and timeout types.
//! - [`denom`]: denomination traces and voucher naming.
//! - [`transport`]: the transport seam and its in-memory outbox.
//! - [`lifecycle`]: the per-transfer state machine and its coordinator.

pub mod denom;
pub mod lifecycle;
pub mod transport;
pub mod types;

pub use denom::DenomTrace;
pub use lifecycle::{
    LifecycleEvent, PacketError, PacketLifecycleCoordinator, PendingPacket, Resolution,
    TransferContext, TransferError, TransferOutcome, TransferRequest, TransferState, Transition,
};
pub use transport::{PacketOutbox, Transport, TransportError};
pub use types::{AckError, Acknowledgement, OutboundPacket, Packet, PacketData, Sequence, Timeout};
