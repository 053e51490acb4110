//! # Async Relayer
//!
//! Relays packets between two chains shared behind `parking_lot` mutexes.
//! A pass drains each chain's outbox, delivers every packet to the other
//! chain and reports the verdict back, locking one chain at a time. No lock
//! is held across an `.await`.
//!
//! A pass that fails hands its unfinished packets back to the origin's
//! outbox and stops the background task. The error is kept so that
//! [`AsyncRelayer::settle`] reports it instead of waiting forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tokengate_protocol::chain::{Chain, ChainError};
use tokengate_protocol::packet::Packet;
use tokengate_protocol::relayer::{self, RelayStats};

use crate::metrics::NodeMetrics;

pub type SharedChain = Arc<Mutex<Chain>>;

#[derive(Clone)]
pub struct AsyncRelayer {
    a: SharedChain,
    b: SharedChain,
    metrics: NodeMetrics,
    stats: Arc<Mutex<RelayStats>>,
    failure: Arc<Mutex<Option<ChainError>>>,
}

impl AsyncRelayer {
    pub fn new(a: SharedChain, b: SharedChain, metrics: NodeMetrics) -> Self {
        Self {
            a,
            b,
            metrics,
            stats: Arc::new(Mutex::new(RelayStats::default())),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn stats(&self) -> RelayStats {
        *self.stats.lock()
    }

    /// One pass in both directions. Returns the number of packets relayed.
    pub async fn relay_once(&self) -> Result<usize, ChainError> {
        let started = Instant::now();
        let forward = self.relay_direction(&self.a, &self.b).await?;
        let backward = self.relay_direction(&self.b, &self.a).await?;
        self.metrics
            .relay_pass_seconds
            .observe(started.elapsed().as_secs_f64());
        Ok(forward + backward)
    }

    async fn relay_direction(
        &self,
        origin: &SharedChain,
        destination: &SharedChain,
    ) -> Result<usize, ChainError> {
        let packets = origin.lock().take_outbound_packets();
        for (index, packet) in packets.iter().enumerate() {
            if let Err(err) = self.relay_packet(origin, destination, packet) {
                origin
                    .lock()
                    .requeue_outbound_packets(packets[index..].to_vec());
                return Err(err);
            }
            tokio::task::yield_now().await;
        }
        Ok(packets.len())
    }

    fn relay_packet(
        &self,
        origin: &SharedChain,
        destination: &SharedChain,
        packet: &Packet,
    ) -> Result<(), ChainError> {
        let settled = relayer::settled(&*origin.lock(), packet);
        if settled.is_some() {
            self.stats.lock().record_settled();
            tracing::debug!(sequence = packet.sequence, "packet already resolved, skipped");
            return Ok(());
        }
        let delivery = relayer::deliver(&mut *destination.lock(), packet)?;
        let resolution = relayer::resolve(&mut *origin.lock(), packet, delivery.clone())?;
        self.metrics.record_relay(&delivery, &resolution);
        self.stats.lock().record(&delivery, &resolution);
        tracing::debug!(sequence = packet.sequence, ?resolution, "packet relayed");
        Ok(())
    }

    /// True when neither chain has queued or unresolved packets.
    pub fn is_idle(&self) -> bool {
        [&self.a, &self.b].iter().all(|chain| {
            let chain = chain.lock();
            chain.outbox().unrelayed_len() == 0 && chain.pending_transfers().next().is_none()
        })
    }

    /// Runs passes every `interval` until `shutdown` flips to true, then
    /// makes a final pass so nothing committed before shutdown is stranded.
    pub fn spawn(
        self,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<RelayStats, ChainError>> {
        tokio::spawn(async move {
            let result = self.run(interval, shutdown).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "relayer stopped");
                *self.failure.lock() = Some(err.clone());
            }
            result
        })
    }

    async fn run(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RelayStats, ChainError> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let relayed = self.relay_once().await?;
                    if relayed > 0 {
                        tracing::info!(relayed, "relayer pass");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.relay_once().await?;
        tracing::info!(stats = ?self.stats(), "relayer stopped");
        Ok(self.stats())
    }

    /// Waits until the background relayer has drained both chains. Fails
    /// with the relayer's error if it stopped on one.
    pub async fn settle(&self, poll: Duration) -> Result<(), ChainError> {
        loop {
            let failure = self.failure.lock().clone();
            if let Some(err) = failure {
                return Err(err);
            }
            if self.is_idle() {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
