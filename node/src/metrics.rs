//! # Prometheus Metrics
//!
//! Counters for the simulated network, kept in a dedicated registry under
//! the `tokengate` namespace. `simulate --metrics` prints them in the text
//! exposition format after the run.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use tokengate_protocol::packet::Resolution;
use tokengate_protocol::relayer::Delivery;
use tokengate_protocol::Denial;

/// Metric handles. Cloning shares the underlying counters.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Cross-chain transfers submitted, admitted or not.
    pub transfers_submitted_total: IntCounter,
    /// Transfers the gate refused, by denial reason.
    pub transfers_denied_total: IntCounterVec,
    /// Packets delivered to a destination chain.
    pub packets_relayed_total: IntCounter,
    pub acks_success_total: IntCounter,
    pub acks_error_total: IntCounter,
    pub timeouts_total: IntCounter,
    /// Escrows returned to their sender, by error ack or timeout.
    pub refunds_total: IntCounter,
    /// Time taken by one relayer pass over both directions.
    pub relay_pass_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tokengate".into()), None)?;

        let transfers_submitted_total = IntCounter::new(
            "transfers_submitted_total",
            "Cross-chain transfers submitted to the issuing or counterparty chain",
        )?;
        registry.register(Box::new(transfers_submitted_total.clone()))?;

        let transfers_denied_total = IntCounterVec::new(
            Opts::new(
                "transfers_denied_total",
                "Transfers refused by the compliance gate",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(transfers_denied_total.clone()))?;

        let packets_relayed_total =
            IntCounter::new("packets_relayed_total", "Packets delivered by the relayer")?;
        registry.register(Box::new(packets_relayed_total.clone()))?;

        let acks_success_total =
            IntCounter::new("acks_success_total", "Success acknowledgements applied")?;
        registry.register(Box::new(acks_success_total.clone()))?;

        let acks_error_total =
            IntCounter::new("acks_error_total", "Error acknowledgements applied")?;
        registry.register(Box::new(acks_error_total.clone()))?;

        let timeouts_total = IntCounter::new("timeouts_total", "Packets timed out")?;
        registry.register(Box::new(timeouts_total.clone()))?;

        let refunds_total = IntCounter::new("refunds_total", "Escrows refunded to their sender")?;
        registry.register(Box::new(refunds_total.clone()))?;

        let relay_pass_seconds = Histogram::with_opts(
            HistogramOpts::new("relay_pass_seconds", "Duration of one relayer pass")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(relay_pass_seconds.clone()))?;

        Ok(Self {
            registry,
            transfers_submitted_total,
            transfers_denied_total,
            packets_relayed_total,
            acks_success_total,
            acks_error_total,
            timeouts_total,
            refunds_total,
            relay_pass_seconds,
        })
    }

    pub fn record_denial(&self, reason: &Denial) {
        self.transfers_denied_total
            .with_label_values(&[reason.code()])
            .inc();
    }

    /// Counts one relayed packet by what the destination did with it and
    /// how the origin resolved it.
    pub fn record_relay(&self, delivery: &Delivery, resolution: &Resolution) {
        self.packets_relayed_total.inc();
        if matches!(resolution, Resolution::Duplicate { .. }) {
            return;
        }
        match delivery {
            Delivery::Acknowledged(ack) if ack.is_success() => self.acks_success_total.inc(),
            Delivery::Acknowledged(_) => self.acks_error_total.inc(),
            Delivery::Expired => self.timeouts_total.inc(),
        }
        if matches!(resolution, Resolution::Refunded { .. }) {
            self.refunds_total.inc();
        }
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokengate_protocol::packet::{AckError, Acknowledgement};

    #[test]
    fn relay_outcomes_are_counted() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_relay(
            &Delivery::Acknowledged(Acknowledgement::Success),
            &Resolution::Finalized { sequence: 1 },
        );
        metrics.record_relay(
            &Delivery::Acknowledged(Acknowledgement::Error(AckError::Denied(
                Denial::ReceiverBlacklisted,
            ))),
            &Resolution::Refunded {
                sequence: 2,
                amount: 5,
            },
        );
        metrics.record_relay(
            &Delivery::Expired,
            &Resolution::Refunded {
                sequence: 3,
                amount: 5,
            },
        );

        assert_eq!(metrics.packets_relayed_total.get(), 3);
        assert_eq!(metrics.acks_success_total.get(), 1);
        assert_eq!(metrics.acks_error_total.get(), 1);
        assert_eq!(metrics.timeouts_total.get(), 1);
        assert_eq!(metrics.refunds_total.get(), 2);
    }

    #[test]
    fn encoded_output_is_namespaced() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_denial(&Denial::SenderBlacklisted);
        let text = metrics.encode().unwrap();
        assert!(text.contains("tokengate_transfers_denied_total{reason=\"sender_blacklisted\"} 1"));
    }
}
