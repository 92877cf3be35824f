use std::collections::VecDeque;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::cells::Packet;
use crate::error::ConfigError;

pub mod disc;
pub mod rem;

pub use disc::QueueDisc;
pub use rem::{RemConfig, RemController, RemQueue, RemStats};

/// Unit in which queue limits, targets and occupancy are expressed.
///
/// Every place that turns a packet or a queue into a number goes through this type, so the
/// admission test, the occupancy query and the update rule always agree on the unit.
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(try_from = "String", into = "String")
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueueMode {
    Bytes,
    #[default]
    Packets,
}

impl QueueMode {
    /// How much a packet adds to the queue: its network layer length, or one packet.
    pub fn contribution<P: Packet>(&self, packet: &P) -> usize {
        match self {
            QueueMode::Bytes => packet.l3_length(),
            QueueMode::Packets => 1,
        }
    }

    pub fn occupancy(&self, packets: usize, bytes: usize) -> usize {
        match self {
            QueueMode::Bytes => bytes,
            QueueMode::Packets => packets,
        }
    }

    /// Normalize a length in this unit to (fractional) packets of `mean_packet_size` bytes.
    pub fn to_packets(&self, value: f64, mean_packet_size: u32) -> f64 {
        match self {
            QueueMode::Bytes => value / mean_packet_size as f64,
            QueueMode::Packets => value,
        }
    }
}

impl Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueMode::Bytes => f.write_str("bytes"),
            QueueMode::Packets => f.write_str("packets"),
        }
    }
}

impl FromStr for QueueMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bytes" | "queue_mode_bytes" => Ok(QueueMode::Bytes),
            "packets" | "queue_mode_packets" => Ok(QueueMode::Packets),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for QueueMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QueueMode> for String {
    fn from(mode: QueueMode) -> Self {
        mode.to_string()
    }
}

/// Outcome of the admission test for one arriving packet.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Probabilistic drop of a packet that would have fit.
    DropEarly,
    /// The packet does not fit under the queue limit.
    DropForced,
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Plain FIFO storage with packet and byte accounting. It never drops anything by itself.
#[derive(Debug)]
pub struct FifoQueue<P> {
    queue: VecDeque<P>,
    now_bytes: usize,
}

impl<P> Default for FifoQueue<P> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            now_bytes: 0,
        }
    }
}

impl<P> FifoQueue<P>
where
    P: Packet,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: P) {
        self.now_bytes += packet.l3_length();
        self.queue.push_back(packet);
    }

    pub fn pop(&mut self) -> Option<P> {
        let packet = self.queue.pop_front()?;
        self.now_bytes -= packet.l3_length();
        Some(packet)
    }

    pub fn peek(&self) -> Option<&P> {
        self.queue.front()
    }

    pub fn occupancy(&self, mode: QueueMode) -> usize {
        mode.occupancy(self.queue.len(), self.now_bytes)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn bytes(&self) -> usize {
        self.now_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The capability an active queue management controller offers to the queue that wraps it.
///
/// The controller only decides; storage belongs to the caller.
pub trait Aqm: Send + Debug {
    #[cfg(feature = "serde")]
    type Config: for<'a> Deserialize<'a> + Serialize + Send + Debug + Clone;
    #[cfg(not(feature = "serde"))]
    type Config: Send + Debug + Clone;
    type Stats: Copy + Debug + Send;

    fn mode(&self) -> QueueMode;

    fn update_interval(&self) -> Duration;

    /// Admission test for a packet of `contribution` arriving at a queue holding `occupancy`,
    /// both in the unit of `self.mode()`.
    fn admit<R: Rng>(&mut self, contribution: usize, occupancy: usize, rng: &mut R) -> Verdict;

    /// Periodic recomputation, called once per `update_interval`.
    fn on_tick(&mut self, occupancy: usize);

    fn config(&self) -> &Self::Config;

    /// Validate and apply a new configuration. On error nothing changes.
    fn configure(&mut self, config: Self::Config) -> Result<(), ConfigError>;

    fn check_config(&self) -> Result<(), ConfigError>;

    fn stats(&self) -> Self::Stats;

    /// Back to the initial derived state and statistics, keeping the configuration.
    fn reset(&mut self);
}

/// A FIFO queue guarded by an [`Aqm`] controller and the random source it draws from.
#[derive(Debug)]
pub struct AqmQueue<P, A, R> {
    queue: FifoQueue<P>,
    controller: A,
    rng: R,
}

impl<P, A, R> AqmQueue<P, A, R>
where
    P: Packet,
    A: Aqm,
    R: Rng + SeedableRng,
{
    pub fn new(controller: A, rng: R) -> Self {
        debug!(?controller, "New AqmQueue");
        Self {
            queue: FifoQueue::new(),
            controller,
            rng,
        }
    }

    /// Check the configuration and bring the controller to its initial state.
    pub fn initialize(&mut self) -> Result<(), ConfigError> {
        self.controller.check_config()?;
        self.controller.reset();
        Ok(())
    }

    pub fn enqueue(&mut self, mut packet: P) -> Verdict {
        let mode = self.controller.mode();
        let contribution = mode.contribution(&packet);
        let occupancy = self.queue.occupancy(mode);
        let verdict = self
            .controller
            .admit(contribution, occupancy, &mut self.rng);
        match verdict {
            Verdict::Accept => {
                packet.set_timestamp(Instant::now());
                self.queue.push(packet);
            }
            Verdict::DropEarly | Verdict::DropForced => {
                trace!(
                    ?verdict,
                    queue_len = self.queue.len(),
                    now_bytes = self.queue.bytes(),
                    header = ?packet.header_hex(),
                    "Drop packet(l3_len: {}) when enqueue",
                    packet.l3_length()
                );
            }
        }
        verdict
    }

    pub fn dequeue(&mut self) -> Option<P> {
        let packet = self.queue.pop()?;
        trace!(
            sojourn = ?Instant::now().saturating_duration_since(packet.get_timestamp()),
            after_queue_len = self.queue.len(),
            after_now_bytes = self.queue.bytes(),
            "Dequeue packet(l3_len: {})",
            packet.l3_length()
        );
        Some(packet)
    }

    pub fn peek(&self) -> Option<&P> {
        self.queue.peek()
    }

    /// Current occupancy in the controller's unit.
    pub fn occupancy(&self) -> usize {
        self.queue.occupancy(self.controller.mode())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn run_update(&mut self) {
        let occupancy = self.occupancy();
        self.controller.on_tick(occupancy);
    }

    pub fn configure(&mut self, config: A::Config) -> Result<(), ConfigError> {
        self.controller.configure(config)
    }

    pub fn stats(&self) -> A::Stats {
        self.controller.stats()
    }

    pub fn controller(&self) -> &A {
        &self.controller
    }

    /// Reseed the random source from `stream`. Returns the number of streams consumed.
    pub fn assign_streams(&mut self, stream: u64) -> u64 {
        debug!(stream, "Assign random stream");
        self.rng = R::seed_from_u64(stream);
        1
    }
}
