//! In-memory network for running several applications in one process.
//!
//! Every attached node gets an unbounded inbox. Station traffic goes to the
//! addressed node, broadcasts go to every node but the sender, and
//! promiscuous nodes also get a copy of everything else. A network can be
//! made lossy: each PDU is dropped with the configured probability, drawn
//! from a seedable RNG so test runs repeat.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use bacstack_core::{Address, Apdu, AppError};

use crate::application::{ApplicationBuilder, ApplicationCore};
use crate::stack::{AccessPoint, LowerLayer, Stack};

/// An application shared between its inbound pump and local callers.
/// The mutex is what serializes calls into the core.
pub type SharedApplication = Arc<AsyncMutex<ApplicationCore>>;

struct Attachment {
    inbox: mpsc::UnboundedSender<Apdu>,
    promiscuous: bool,
}

struct Loss {
    rate: f64,
    rng: StdRng,
}

/// Station address -> inbox.
pub struct Network {
    nodes: DashMap<Address, Attachment>,
    loss: Mutex<Loss>,
}

impl Network {
    /// A lossless network.
    pub fn new() -> Arc<Self> {
        Self::build(0.0, StdRng::from_entropy())
    }

    /// A network that drops each PDU with probability `drop_rate`
    /// (clamped to `0.0..=1.0`). The same seed gives the same losses.
    pub fn lossy(drop_rate: f64, seed: u64) -> Arc<Self> {
        Self::build(drop_rate, StdRng::seed_from_u64(seed))
    }

    fn build(drop_rate: f64, rng: StdRng) -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
            loss: Mutex::new(Loss {
                rate: clamp_rate(drop_rate),
                rng,
            }),
        })
    }

    pub fn drop_rate(&self) -> f64 {
        self.loss.lock().unwrap_or_else(PoisonError::into_inner).rate
    }

    /// Change the loss probability of a running network.
    pub fn set_drop_rate(&self, drop_rate: f64) {
        let rate = clamp_rate(drop_rate);
        self.loss.lock().unwrap_or_else(PoisonError::into_inner).rate = rate;
        tracing::debug!(rate, "drop rate changed");
    }

    /// Attach a station. Reattaching an address replaces the old inbox.
    pub fn attach(self: &Arc<Self>, address: Address) -> (Arc<Node>, mpsc::UnboundedReceiver<Apdu>) {
        self.attach_with(address, false)
    }

    /// Attach a station that also receives traffic addressed to others.
    pub fn attach_promiscuous(
        self: &Arc<Self>,
        address: Address,
    ) -> (Arc<Node>, mpsc::UnboundedReceiver<Apdu>) {
        self.attach_with(address, true)
    }

    fn attach_with(
        self: &Arc<Self>,
        address: Address,
        promiscuous: bool,
    ) -> (Arc<Node>, mpsc::UnboundedReceiver<Apdu>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attachment = Attachment {
            inbox: tx,
            promiscuous,
        };
        if self.nodes.insert(address.clone(), attachment).is_some() {
            tracing::debug!(%address, "node reattached");
        }
        let node = Arc::new(Node {
            address,
            network: self.clone(),
        });
        (node, rx)
    }

    /// Detach a station; its inbox closes once drained.
    pub fn detach(&self, address: &Address) {
        self.nodes.remove(address);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn lost(&self) -> bool {
        let mut loss = self.loss.lock().unwrap_or_else(PoisonError::into_inner);
        let rate = loss.rate;
        rate > 0.0 && loss.rng.gen_bool(rate)
    }

    fn deliver(&self, apdu: Apdu) {
        if self.lost() {
            tracing::trace!(source = %apdu.source, destination = %apdu.destination, "pdu lost");
            return;
        }

        let destination = &apdu.destination;
        if matches!(destination, Address::LocalBroadcast | Address::GlobalBroadcast) {
            for node in self.nodes.iter() {
                if *node.key() != apdu.source {
                    send(node.key(), node.value(), &apdu);
                }
            }
            return;
        }

        let mut delivered = false;
        if destination.is_station() {
            if let Some(node) = self.nodes.get(destination) {
                send(node.key(), node.value(), &apdu);
                delivered = true;
            }
        }
        for node in self.nodes.iter() {
            let key = node.key();
            if node.value().promiscuous && *key != apdu.source && key != destination {
                send(key, node.value(), &apdu);
            }
        }
        if !delivered {
            tracing::trace!(%destination, "no such station, dropped");
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

fn send(address: &Address, attachment: &Attachment, apdu: &Apdu) {
    if attachment.inbox.send(apdu.clone()).is_err() {
        tracing::trace!(%address, "inbox closed");
    }
}

/// One station's attachment; the bottom of its stack.
pub struct Node {
    address: Address,
    network: Arc<Network>,
}

impl Node {
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl LowerLayer for Node {
    fn request(&self, mut apdu: Apdu) {
        apdu.source = self.address.clone();
        self.network.deliver(apdu);
    }
}

/// Feed inbound traffic to the application until the inbox closes.
pub async fn serve(
    app: SharedApplication,
    access_point: AccessPoint,
    mut inbox: mpsc::UnboundedReceiver<Apdu>,
) {
    while let Some(apdu) = inbox.recv().await {
        let mut app = app.lock().await;
        access_point.deliver(&mut *app, apdu);
    }
    tracing::debug!("inbox closed, serve loop exiting");
}

/// Attach an application at `address` and spawn its inbound pump.
///
/// Must be called from within a tokio runtime.
pub fn start(
    network: &Arc<Network>,
    address: Address,
    stack: Stack,
    build: impl FnOnce(ApplicationBuilder) -> ApplicationBuilder,
) -> Result<(SharedApplication, JoinHandle<()>), AppError> {
    let (node, inbox) = network.attach(address.clone());
    let lower = stack.bind(node);
    let app = match build(ApplicationCore::builder(lower.clone())).build() {
        Ok(app) => Arc::new(AsyncMutex::new(app)),
        Err(e) => {
            network.detach(&address);
            return Err(e);
        }
    };
    tracing::info!(%address, "application attached");
    let handle = tokio::spawn(serve(app.clone(), AccessPoint::new(lower), inbox));
    Ok((app, handle))
}
