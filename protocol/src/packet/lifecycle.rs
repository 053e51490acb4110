//! # Packet Lifecycle
//!
//! Drives a cross-chain transfer from the gate decision on the sending
//! chain to its terminal outcome, and handles the inbound leg on the
//! receiving chain.
//!
//! ## Outbound states
//!
//! ```text
//! Initiated ──escrow──▶ Escrowed ──send──▶ PacketSent ──┬─▶ AckSuccess  (finalize)
//!                                                       ├─▶ AckError    (refund)
//!                                                       └─▶ TimedOut    (refund)
//! ```
//!
//! [`PendingPacket::apply`] is the only place a transfer changes state. A
//! pending packet is removed once resolved and its outcome is remembered per
//! sequence, so a second acknowledgement or timeout for the same packet is
//! reported as [`Resolution::Duplicate`] and has no ledger effect. Ack and
//! timeout race for the same slot; whichever is handled first wins.
//!
//! ## Inbound leg
//!
//! The receiving chain runs the gate with [`TransferDirection::Inbound`]
//! before crediting. A denial becomes an error acknowledgement carrying the
//! reason. Receipts are stored per sequence: a re-delivered packet gets the
//! stored acknowledgement back and is not credited twice. A packet that
//! arrives at or past its timeout is refused without a receipt so that the
//! origin can time it out.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::denom::{hop_prefix, receiver_is_source, sender_is_source, DenomTrace};
use super::transport::{Transport, TransportError};
use super::types::{
    AckError, Acknowledgement, OutboundPacket, Packet, PacketData, Sequence, Timeout,
};
use crate::address::{Address, AddressError};
use crate::compliance::{
    Authorization, ComplianceModule, Denial, GrantAction, TransferDirection, TransferIntent,
};
use crate::config::{ChainConfig, DEFAULT_PACKET_TIMEOUT, MAX_MEMO_LENGTH, VOUCHER_DENOM_PREFIX};
use crate::ledger::{BankKeeper, CreditSource, EscrowId, EscrowMode, Ledger, LedgerError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of packet handling that are not acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("no pending transfer with sequence {0}")]
    UnknownSequence(Sequence),

    #[error("no channel bound at {port}/{channel}")]
    UnknownChannel { port: String, channel: String },

    #[error("packet {sequence} has timed out")]
    Expired { sequence: Sequence },

    #[error("invalid transition from {from} via {via}")]
    InvalidTransition {
        from: &'static str,
        via: &'static str,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Why an outbound transfer could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("memo is {len} bytes, maximum is {max}")]
    MemoTooLong { len: usize, max: usize },

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("no denomination trace for {0}")]
    UnknownDenom(String),

    #[error("transfer denied: {0}")]
    Denied(#[from] Denial),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("transport refused packet: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Transfer State Machine
// ---------------------------------------------------------------------------

/// Terminal outcome of an outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    AckSuccess,
    AckError(AckError),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Initiated,
    Escrowed {
        escrow_id: EscrowId,
    },
    PacketSent {
        escrow_id: EscrowId,
        sequence: Sequence,
    },
    Resolved {
        sequence: Sequence,
        outcome: TransferOutcome,
    },
}

impl TransferState {
    pub fn label(&self) -> &'static str {
        match self {
            TransferState::Initiated => "Initiated",
            TransferState::Escrowed { .. } => "Escrowed",
            TransferState::PacketSent { .. } => "PacketSent",
            TransferState::Resolved { .. } => "Resolved",
        }
    }
}

/// Inputs to [`PendingPacket::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Escrow(EscrowId),
    Send {
        sequence: Sequence,
        commitment: String,
    },
    Resolve(TransferOutcome),
}

impl Transition {
    fn label(&self) -> &'static str {
        match self {
            Transition::Escrow(_) => "escrow",
            Transition::Send { .. } => "send",
            Transition::Resolve(_) => "resolve",
        }
    }
}

/// An outbound transfer in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPacket {
    pub sender: Address,
    pub receiver: String,
    /// Local denomination debited from the sender.
    pub denom: String,
    /// Full trace path carried in the packet.
    pub packet_denom: String,
    pub amount: u64,
    pub fee: u64,
    pub timeout: Timeout,
    pub commitment: Option<String>,
    state: TransferState,
}

impl PendingPacket {
    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn sequence(&self) -> Option<Sequence> {
        match self.state {
            TransferState::PacketSent { sequence, .. }
            | TransferState::Resolved { sequence, .. } => Some(sequence),
            _ => None,
        }
    }

    pub fn escrow_id(&self) -> Option<EscrowId> {
        match self.state {
            TransferState::Escrowed { escrow_id } | TransferState::PacketSent { escrow_id, .. } => {
                Some(escrow_id)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TransferState::Resolved { .. })
    }

    /// Advances the transfer. Any transition not drawn in the module
    /// diagram is refused and leaves the state as it was.
    pub fn apply(&mut self, transition: Transition) -> Result<(), PacketError> {
        let next = match (&self.state, transition) {
            (TransferState::Initiated, Transition::Escrow(escrow_id)) => {
                TransferState::Escrowed { escrow_id }
            }
            (
                TransferState::Escrowed { escrow_id },
                Transition::Send {
                    sequence,
                    commitment,
                },
            ) => {
                self.commitment = Some(commitment);
                TransferState::PacketSent {
                    escrow_id: *escrow_id,
                    sequence,
                }
            }
            (TransferState::PacketSent { sequence, .. }, Transition::Resolve(outcome)) => {
                TransferState::Resolved {
                    sequence: *sequence,
                    outcome,
                }
            }
            (state, transition) => {
                return Err(PacketError::InvalidTransition {
                    from: state.label(),
                    via: transition.label(),
                })
            }
        };
        self.state = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Requests, Events & Results
// ---------------------------------------------------------------------------

/// A request to move funds to the counterparty chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Who submits the transfer; a delegate when not the sender.
    pub acting: Address,
    pub sender: Address,
    /// Receiver on the counterparty, bech32 under any prefix or hex.
    pub receiver: String,
    /// Local denomination to send.
    pub denom: String,
    pub amount: u64,
    #[serde(default)]
    pub memo: String,
    /// Defaults to [`DEFAULT_PACKET_TIMEOUT`] after the current block time.
    #[serde(default)]
    pub timeout: Option<Timeout>,
}

impl TransferRequest {
    /// A transfer submitted by the sender itself.
    pub fn new(
        sender: Address,
        receiver: impl Into<String>,
        denom: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            acting: sender,
            sender,
            receiver: receiver.into(),
            denom: denom.into(),
            amount,
            memo: String::new(),
            timeout: None,
        }
    }

    /// Submitted by `acting` on behalf of the sender.
    pub fn acting_as(mut self, acting: Address) -> Self {
        self.acting = acting;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Delivered by the transport once the counterparty has decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Acknowledged {
        sequence: Sequence,
        ack: Acknowledgement,
    },
    TimedOut {
        sequence: Sequence,
    },
}

impl LifecycleEvent {
    pub fn sequence(&self) -> Sequence {
        match self {
            LifecycleEvent::Acknowledged { sequence, .. }
            | LifecycleEvent::TimedOut { sequence } => *sequence,
        }
    }
}

/// What handling a [`LifecycleEvent`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Success ack: the escrow was settled for good.
    Finalized { sequence: Sequence },
    /// Error ack or timeout: `amount` went back to the sender.
    Refunded { sequence: Sequence, amount: u64 },
    /// Already resolved earlier with `outcome`; nothing changed.
    Duplicate {
        sequence: Sequence,
        outcome: TransferOutcome,
    },
}

/// The chain state a coordinator operation works on, borrowed for one step.
pub struct TransferContext<'a, B: BankKeeper> {
    pub config: &'a ChainConfig,
    pub compliance: &'a mut ComplianceModule,
    pub ledger: &'a mut Ledger<B>,
    pub height: u64,
    pub time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PacketLifecycleCoordinator {
    pending: BTreeMap<Sequence, PendingPacket>,
    resolved: HashMap<Sequence, TransferOutcome>,
    receipts: HashMap<Sequence, Acknowledgement>,
    traces: HashMap<String, DenomTrace>,
}

impl PacketLifecycleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Outbound -----------------------------------------------------------

    /// Gates, escrows and sends a transfer. Returns the packet sequence.
    ///
    /// Nothing is left applied on failure: a denial happens before any
    /// mutation, and a transport refusal refunds the escrow and restores
    /// any grant that was charged.
    pub fn send_transfer<B: BankKeeper, T: Transport>(
        &mut self,
        ctx: TransferContext<'_, B>,
        transport: &mut T,
        request: TransferRequest,
    ) -> Result<Sequence, TransferError> {
        let TransferContext {
            config,
            compliance,
            ledger,
            time,
            ..
        } = ctx;

        if request.amount == 0 {
            return Err(TransferError::ZeroAmount);
        }
        if request.memo.len() > MAX_MEMO_LENGTH {
            return Err(TransferError::MemoTooLong {
                len: request.memo.len(),
                max: MAX_MEMO_LENGTH,
            });
        }
        let receiver: Address = request.receiver.parse()?;
        let trace = self.trace_of(&request.denom)?;

        let intent = TransferIntent {
            acting: request.acting,
            sender: request.sender,
            receiver,
            denom: request.denom.clone(),
            amount: request.amount,
            direction: TransferDirection::Outbound,
            action: GrantAction::Transfer,
        };
        let admission = compliance
            .gate(time)
            .evaluate(&intent, &*ledger)
            .map_err(|reason| {
                tracing::warn!(
                    chain_id = %config.chain_id,
                    sender = %request.sender,
                    amount = request.amount,
                    %reason,
                    "outbound transfer denied"
                );
                TransferError::Denied(reason)
            })?;

        let channel = &config.channel;
        let full_path = trace.full_path();
        let mode = if sender_is_source(&channel.port_id, &channel.channel_id, &full_path) {
            EscrowMode::Escrow {
                escrow_account: channel.escrow_address(),
            }
        } else {
            EscrowMode::Burn
        };
        let fee = config.fee.fee_for(&trace.base_denom, request.amount);
        let timeout = request.timeout.unwrap_or_else(|| {
            let relative = chrono::Duration::seconds(DEFAULT_PACKET_TIMEOUT.as_secs() as i64);
            Timeout::at_time(time + relative)
        });

        let outbound = OutboundPacket {
            source_port: channel.port_id.clone(),
            source_channel: channel.channel_id.clone(),
            destination_port: channel.counterparty_port_id.clone(),
            destination_channel: channel.counterparty_channel_id.clone(),
            data: PacketData {
                denom: full_path.clone(),
                amount: request.amount,
                fee,
                sender: request.sender.to_bech32(&config.bech32_prefix)?,
                receiver: request.receiver.clone(),
                memo: request.memo.clone(),
            },
            timeout,
        };
        let commitment = outbound
            .data
            .commitment()
            .map_err(|e| TransportError::Encoding(e.to_string()))?;

        let pending = PendingPacket {
            sender: request.sender,
            receiver: request.receiver,
            denom: request.denom,
            packet_denom: full_path,
            amount: request.amount,
            fee,
            timeout,
            commitment: None,
            state: TransferState::Initiated,
        };

        let escrow_id =
            ledger.debit_for_transfer(&pending.sender, &pending.denom, pending.amount, mode)?;

        match self.commit(
            compliance,
            transport,
            pending,
            escrow_id,
            &admission.authorization,
            outbound,
            commitment,
        ) {
            Ok(sequence) => {
                tracing::info!(
                    chain_id = %config.chain_id,
                    sequence,
                    amount = request.amount,
                    fee,
                    ?mode,
                    "packet sent"
                );
                Ok(sequence)
            }
            Err(err) => {
                ledger.refund(escrow_id)?;
                tracing::warn!(chain_id = %config.chain_id, error = %err, "transfer rolled back");
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit<T: Transport>(
        &mut self,
        compliance: &mut ComplianceModule,
        transport: &mut T,
        mut pending: PendingPacket,
        escrow_id: EscrowId,
        authorization: &Authorization,
        outbound: OutboundPacket,
        commitment: String,
    ) -> Result<Sequence, TransferError> {
        pending.apply(Transition::Escrow(escrow_id))?;

        let charged = compliance
            .delegations_mut()
            .consume(authorization)
            .map_err(Denial::from)?;

        let sequence = match transport.send_packet(outbound) {
            Ok(sequence) => sequence,
            Err(err) => {
                if let Some(grant) = charged {
                    compliance.delegations_mut().reinstate(grant);
                }
                return Err(err.into());
            }
        };

        pending.apply(Transition::Send {
            sequence,
            commitment,
        })?;
        self.pending.insert(sequence, pending);
        Ok(sequence)
    }

    /// Applies the counterparty's verdict on a sent packet.
    pub fn handle<B: BankKeeper>(
        &mut self,
        ledger: &mut Ledger<B>,
        event: LifecycleEvent,
    ) -> Result<Resolution, PacketError> {
        let sequence = event.sequence();
        if let Some(outcome) = self.resolved.get(&sequence) {
            tracing::debug!(sequence, ?outcome, "duplicate lifecycle event ignored");
            return Ok(Resolution::Duplicate {
                sequence,
                outcome: outcome.clone(),
            });
        }

        let pending = self
            .pending
            .get(&sequence)
            .ok_or(PacketError::UnknownSequence(sequence))?;
        let escrow_id = match pending.state() {
            TransferState::PacketSent { escrow_id, .. } => *escrow_id,
            other => {
                return Err(PacketError::InvalidTransition {
                    from: other.label(),
                    via: "resolve",
                })
            }
        };

        let (outcome, resolution) = match event {
            LifecycleEvent::Acknowledged {
                ack: Acknowledgement::Success,
                ..
            } => {
                ledger.finalize(escrow_id)?;
                (TransferOutcome::AckSuccess, Resolution::Finalized { sequence })
            }
            LifecycleEvent::Acknowledged {
                ack: Acknowledgement::Error(reason),
                ..
            } => {
                let record = ledger.refund(escrow_id)?;
                tracing::warn!(sequence, %reason, amount = record.amount, "error ack, refunded");
                (
                    TransferOutcome::AckError(reason),
                    Resolution::Refunded {
                        sequence,
                        amount: record.amount,
                    },
                )
            }
            LifecycleEvent::TimedOut { .. } => {
                let record = ledger.refund(escrow_id)?;
                tracing::info!(sequence, amount = record.amount, "packet timed out, refunded");
                (
                    TransferOutcome::TimedOut,
                    Resolution::Refunded {
                        sequence,
                        amount: record.amount,
                    },
                )
            }
        };

        let mut pending = self
            .pending
            .remove(&sequence)
            .ok_or(PacketError::UnknownSequence(sequence))?;
        pending.apply(Transition::Resolve(outcome.clone()))?;
        self.resolved.insert(sequence, outcome);
        Ok(resolution)
    }

    // -- Inbound ------------------------------------------------------------

    /// Receives a packet from the counterparty and returns the
    /// acknowledgement to send back.
    pub fn receive<B: BankKeeper>(
        &mut self,
        ctx: TransferContext<'_, B>,
        packet: &Packet,
    ) -> Result<Acknowledgement, PacketError> {
        let channel = &ctx.config.channel;
        if packet.destination_port != channel.port_id
            || packet.destination_channel != channel.channel_id
            || packet.source_port != channel.counterparty_port_id
            || packet.source_channel != channel.counterparty_channel_id
        {
            return Err(PacketError::UnknownChannel {
                port: packet.destination_port.clone(),
                channel: packet.destination_channel.clone(),
            });
        }

        if let Some(ack) = self.receipts.get(&packet.sequence) {
            tracing::debug!(sequence = packet.sequence, "packet already received");
            return Ok(ack.clone());
        }
        if packet.timeout.has_expired(ctx.height, ctx.time) {
            return Err(PacketError::Expired {
                sequence: packet.sequence,
            });
        }

        let chain_id = ctx.config.chain_id.clone();
        let ack = match self.credit_inbound(ctx, packet) {
            Ok(()) => {
                tracing::info!(
                    %chain_id,
                    sequence = packet.sequence,
                    amount = packet.data.amount,
                    fee = packet.data.fee,
                    "packet received"
                );
                Acknowledgement::Success
            }
            Err(reason) => {
                tracing::warn!(%chain_id, sequence = packet.sequence, %reason, "packet refused");
                Acknowledgement::Error(reason)
            }
        };
        self.receipts.insert(packet.sequence, ack.clone());
        Ok(ack)
    }

    fn credit_inbound<B: BankKeeper>(
        &mut self,
        ctx: TransferContext<'_, B>,
        packet: &Packet,
    ) -> Result<(), AckError> {
        let data = &packet.data;
        if data.amount == 0 {
            return Err(AckError::InvalidPacket("zero amount".into()));
        }
        if data.fee > data.amount {
            return Err(AckError::InvalidPacket(format!(
                "fee {} exceeds amount {}",
                data.fee, data.amount
            )));
        }
        let sender: Address = data
            .sender
            .parse()
            .map_err(|e| AckError::InvalidPacket(format!("sender: {e}")))?;
        let receiver: Address = data
            .receiver
            .parse()
            .map_err(|e| AckError::InvalidPacket(format!("receiver: {e}")))?;

        let returning =
            receiver_is_source(&packet.source_port, &packet.source_channel, &data.denom);
        let (local_denom, source, new_trace) = if returning {
            let prefix = hop_prefix(&packet.source_port, &packet.source_channel);
            let unprefixed = data.denom.strip_prefix(prefix.as_str()).unwrap_or(&data.denom);
            let source = CreditSource::Unescrow {
                escrow_account: ctx.config.channel.escrow_address(),
            };
            (DenomTrace::parse(unprefixed).ibc_denom(), source, None)
        } else {
            let prefixed = format!(
                "{}{}",
                hop_prefix(&packet.destination_port, &packet.destination_channel),
                data.denom
            );
            let trace = DenomTrace::parse(&prefixed);
            (trace.ibc_denom(), CreditSource::Mint, Some(trace))
        };

        let intent = TransferIntent {
            acting: sender,
            sender,
            receiver,
            denom: local_denom.clone(),
            amount: data.amount,
            direction: TransferDirection::Inbound,
            action: GrantAction::Transfer,
        };
        ctx.compliance
            .gate(ctx.time)
            .evaluate(&intent, &*ctx.ledger)
            .map_err(AckError::Denied)?;

        ctx.ledger
            .credit_from_transfer(&receiver, &local_denom, data.amount, data.fee, source)
            .map_err(|e| AckError::Ledger(e.to_string()))?;

        if let Some(trace) = new_trace {
            self.traces.entry(local_denom).or_insert(trace);
        }
        Ok(())
    }

    // -- Queries ------------------------------------------------------------

    fn trace_of(&self, denom: &str) -> Result<DenomTrace, TransferError> {
        if denom.starts_with(VOUCHER_DENOM_PREFIX) {
            self.traces
                .get(denom)
                .cloned()
                .ok_or_else(|| TransferError::UnknownDenom(denom.to_string()))
        } else {
            Ok(DenomTrace::native(denom))
        }
    }

    pub fn pending(&self, sequence: Sequence) -> Option<&PendingPacket> {
        self.pending.get(&sequence)
    }

    /// In-flight transfers in sequence order.
    pub fn pending_packets(&self) -> impl Iterator<Item = (Sequence, &PendingPacket)> {
        self.pending.iter().map(|(s, p)| (*s, p))
    }

    pub fn outcome(&self, sequence: Sequence) -> Option<&TransferOutcome> {
        self.resolved.get(&sequence)
    }

    pub fn receipt(&self, sequence: Sequence) -> Option<&Acknowledgement> {
        self.receipts.get(&sequence)
    }

    /// Trace behind a voucher denomination minted here.
    pub fn denom_trace(&self, ibc_denom: &str) -> Option<&DenomTrace> {
        self.traces.get(ibc_denom)
    }

    pub fn denom_traces(&self) -> impl Iterator<Item = &DenomTrace> {
        self.traces.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
