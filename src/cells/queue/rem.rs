// REM (Random Exponential Marking) Implementation Reference:
// S. Athuraliya, V. H. Li, S. H. Low and Q. Yin, "REM: active queue management", IEEE Network 2001
// https://github.com/nsnam/ns-3-dev-git/blob/ns-3.27/src/traffic-control/model/rem-queue-disc.cc

use bandwidth::Bandwidth;
use human_bandwidth::format_bandwidth;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, info, trace};

use super::{Aqm, AqmQueue, QueueMode, Verdict};
use crate::cells::Packet;
use crate::error::ConfigError;

/// Tunables of a REM queue. Every setter validates its value and leaves the config untouched
/// when the value is rejected.
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct RemConfig {
    mode: QueueMode,
    queue_limit: usize, // hard capacity, in `mode` units
    target: usize,      // desired queue length, in `mode` units
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    update_interval: Duration, // period of the link price update
    mean_packet_size: u32, // in bytes
    input_weight: f64,     // weight of the newest input rate sample
    gamma: f64,            // step size of the link price
    phi: f64,              // base of the price to probability mapping
    alpha: f64,            // reserved, not used by the update rule
    #[cfg_attr(feature = "serde", serde(with = "human_bandwidth::serde"))]
    link_bandwidth: Bandwidth,
}

impl Default for RemConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::Packets,
            queue_limit: 50,
            target: 20,
            update_interval: Duration::from_millis(2),
            mean_packet_size: 1000,
            input_weight: 1.0,
            gamma: 0.001,
            phi: 1.001,
            alpha: 0.1,
            link_bandwidth: Bandwidth::from_kbps(1500),
        }
    }
}

fn check_update_interval(update_interval: Duration) -> Result<(), ConfigError> {
    if update_interval.is_zero() {
        return Err(ConfigError::ZeroUpdateInterval);
    }
    Ok(())
}

fn check_mean_packet_size(mean_packet_size: u32) -> Result<(), ConfigError> {
    if mean_packet_size == 0 {
        return Err(ConfigError::out_of_range(
            "mean_packet_size",
            mean_packet_size,
            "> 0",
        ));
    }
    Ok(())
}

fn check_input_weight(input_weight: f64) -> Result<(), ConfigError> {
    if input_weight > 0.0 && input_weight <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(
            "input_weight",
            input_weight,
            "in (0, 1]",
        ))
    }
}

fn check_gamma(gamma: f64) -> Result<(), ConfigError> {
    if gamma > 0.0 && gamma < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range("gamma", gamma, "in (0, 1)"))
    }
}

fn check_phi(phi: f64) -> Result<(), ConfigError> {
    if phi > 1.0 && phi.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::out_of_range("phi", phi, "> 1"))
    }
}

fn check_alpha(alpha: f64) -> Result<(), ConfigError> {
    if alpha.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::out_of_range("alpha", alpha, "a finite number"))
    }
}

fn check_link_bandwidth(link_bandwidth: Bandwidth) -> Result<(), ConfigError> {
    if link_bandwidth.as_bps() == 0 {
        return Err(ConfigError::out_of_range(
            "link_bandwidth",
            format_bandwidth(link_bandwidth),
            "> 0bps",
        ));
    }
    Ok(())
}

impl RemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every field. Needed for configs that did not go through the setters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_update_interval(self.update_interval)?;
        check_mean_packet_size(self.mean_packet_size)?;
        check_input_weight(self.input_weight)?;
        check_gamma(self.gamma)?;
        check_phi(self.phi)?;
        check_alpha(self.alpha)?;
        check_link_bandwidth(self.link_bandwidth)?;
        Ok(())
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: QueueMode) -> Result<&mut Self, ConfigError> {
        self.mode = mode;
        Ok(self)
    }

    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    pub fn set_queue_limit(&mut self, queue_limit: usize) -> Result<&mut Self, ConfigError> {
        self.queue_limit = queue_limit;
        Ok(self)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn set_target(&mut self, target: usize) -> Result<&mut Self, ConfigError> {
        self.target = target;
        Ok(self)
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn set_update_interval(
        &mut self,
        update_interval: Duration,
    ) -> Result<&mut Self, ConfigError> {
        check_update_interval(update_interval)?;
        self.update_interval = update_interval;
        Ok(self)
    }

    pub fn mean_packet_size(&self) -> u32 {
        self.mean_packet_size
    }

    pub fn set_mean_packet_size(
        &mut self,
        mean_packet_size: u32,
    ) -> Result<&mut Self, ConfigError> {
        check_mean_packet_size(mean_packet_size)?;
        self.mean_packet_size = mean_packet_size;
        Ok(self)
    }

    pub fn input_weight(&self) -> f64 {
        self.input_weight
    }

    pub fn set_input_weight(&mut self, input_weight: f64) -> Result<&mut Self, ConfigError> {
        check_input_weight(input_weight)?;
        self.input_weight = input_weight;
        Ok(self)
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn set_gamma(&mut self, gamma: f64) -> Result<&mut Self, ConfigError> {
        check_gamma(gamma)?;
        self.gamma = gamma;
        Ok(self)
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn set_phi(&mut self, phi: f64) -> Result<&mut Self, ConfigError> {
        check_phi(phi)?;
        self.phi = phi;
        Ok(self)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) -> Result<&mut Self, ConfigError> {
        check_alpha(alpha)?;
        self.alpha = alpha;
        Ok(self)
    }

    pub fn link_bandwidth(&self) -> Bandwidth {
        self.link_bandwidth
    }

    pub fn set_link_bandwidth(
        &mut self,
        link_bandwidth: Bandwidth,
    ) -> Result<&mut Self, ConfigError> {
        check_link_bandwidth(link_bandwidth)?;
        self.link_bandwidth = link_bandwidth;
        Ok(self)
    }

    /// Link capacity in mean-sized packets per second.
    pub fn capacity_pps(&self) -> f64 {
        self.link_bandwidth.as_bps() as f64 / (8.0 * self.mean_packet_size as f64)
    }
}

#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemStats {
    pub unforced_drop: u64,    // early probabilistic drops
    pub queue_limit_drop: u64, // drops because the queue was full
}

/// Maps a link price to a drop probability: `1 - phi^(-price)`, clamped into `[0, 1]`.
pub fn price_to_probability(phi: f64, link_price: f64) -> f64 {
    (1.0 - phi.powf(-link_price)).clamp(0.0, 1.0)
}

#[derive(Debug)]
pub struct RemController {
    config: RemConfig,

    arrivals: usize,       // admitted traffic in the current interval, in `mode` units
    input_rate: f64,       // smoothed input rate, in packets per second
    link_price: f64,       // congestion measure, never negative
    drop_probability: f64, // derived from `link_price`
    updates: u64,          // update rule runs since the last reset
    stats: RemStats,
}

impl Default for RemController {
    fn default() -> Self {
        Self::from_valid(RemConfig::default())
    }
}

impl RemController {
    pub fn new(config: RemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: RemConfig) -> Self {
        debug!(?config, "New RemController");
        Self {
            config,
            arrivals: 0,
            input_rate: 0.0,
            link_price: 0.0,
            drop_probability: 0.0,
            updates: 0,
            stats: RemStats::default(),
        }
    }

    pub fn link_price(&self) -> f64 {
        self.link_price
    }

    pub fn drop_probability(&self) -> f64 {
        self.drop_probability
    }

    pub fn input_rate(&self) -> f64 {
        self.input_rate
    }

    pub fn arrivals(&self) -> usize {
        self.arrivals
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Recompute input rate, link price and drop probability from the queue occupancy and the
    /// traffic admitted since the previous call, then start a new interval.
    pub fn update(&mut self, occupancy: usize) {
        let RemConfig {
            mode,
            target,
            update_interval,
            mean_packet_size,
            input_weight,
            gamma,
            phi,
            ..
        } = self.config;
        let interval = update_interval.as_secs_f64();

        let arrived = mode.to_packets(self.arrivals as f64, mean_packet_size);
        self.input_rate =
            (1.0 - input_weight) * self.input_rate + input_weight * arrived / interval;

        let queue_error = mode.to_packets(occupancy as f64, mean_packet_size)
            - mode.to_packets(target as f64, mean_packet_size);
        // packets per interval above what the link can drain
        let rate_error = (self.input_rate - self.config.capacity_pps()) * interval;

        self.link_price = (self.link_price + gamma * (queue_error + rate_error)).max(0.0);
        self.drop_probability = price_to_probability(phi, self.link_price);
        debug_assert!(self.link_price >= 0.0);
        debug_assert!((0.0..=1.0).contains(&self.drop_probability));

        trace!(
            occupancy,
            arrivals = self.arrivals,
            input_rate = self.input_rate,
            queue_error,
            rate_error,
            link_price = self.link_price,
            drop_probability = self.drop_probability,
            "REM update"
        );
        self.arrivals = 0;
        self.updates += 1;
    }
}

impl Aqm for RemController {
    type Config = RemConfig;
    type Stats = RemStats;

    fn mode(&self) -> QueueMode {
        self.config.mode
    }

    fn update_interval(&self) -> Duration {
        self.config.update_interval
    }

    fn admit<R: Rng>(&mut self, contribution: usize, occupancy: usize, rng: &mut R) -> Verdict {
        if occupancy.saturating_add(contribution) > self.config.queue_limit {
            self.stats.queue_limit_drop += 1;
            return Verdict::DropForced;
        }
        let u: f64 = rng.random();
        if u < self.drop_probability {
            self.stats.unforced_drop += 1;
            Verdict::DropEarly
        } else {
            self.arrivals += contribution;
            Verdict::Accept
        }
    }

    fn on_tick(&mut self, occupancy: usize) {
        self.update(occupancy);
    }

    fn config(&self) -> &RemConfig {
        &self.config
    }

    fn configure(&mut self, config: RemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.mode != self.config.mode || config.mean_packet_size != self.config.mean_packet_size
        {
            // the interval accumulator is kept in the old unit
            self.arrivals = 0;
        }
        info!(
            ?config,
            link_bandwidth = %format_bandwidth(config.link_bandwidth),
            "Set REM config"
        );
        self.config = config;
        Ok(())
    }

    fn check_config(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    fn stats(&self) -> RemStats {
        self.stats
    }

    fn reset(&mut self) {
        debug!("Reset REM state");
        self.arrivals = 0;
        self.input_rate = 0.0;
        self.link_price = 0.0;
        self.drop_probability = 0.0;
        self.updates = 0;
        self.stats = RemStats::default();
    }
}

pub type RemQueue<P, R = StdRng> = AqmQueue<P, RemController, R>;

impl<P, R> AqmQueue<P, RemController, R>
where
    P: Packet,
    R: Rng + SeedableRng,
{
    pub fn with_config(config: RemConfig, rng: R) -> Result<Self, ConfigError> {
        Ok(Self::new(RemController::new(config)?, rng))
    }
}
