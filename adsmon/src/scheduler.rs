//! The scheduler drives the read-filter-publish cycle for every attached
//! channel.
//!
//! # Cycles
//!
//! Each attached channel gets one task that owns its [`SamplingState`]. The
//! task waits for the next tick of a fixed-period interval, then runs one
//! cycle to completion before waiting again, so two cycles of the same
//! channel never overlap. When a cycle takes longer than the period the
//! missed ticks are skipped rather than queued.
//!
//! A cycle:
//! 1. re-checks that pin and differential pin differ (a record that bypassed
//!    attach-time validation is marked unavailable, not run),
//! 2. reads the converter through [`adapter::read_voltage`],
//! 3. on failure marks the channel unavailable and leaves the last published
//!    value alone,
//! 4. on success marks it available and publishes the value if the change
//!    filter admits it.
//!
//! # Detach
//!
//! Detaching cancels the channel's token and waits for its task. A cycle
//! already past its tick finishes its read, sees the token and drops the
//! result without publishing or touching state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::adapter;
use crate::channel::{ChannelConfig, ChannelId, ConfigError};
use crate::filter::{ChangeFilter, SamplingState};
use crate::hw_trait::AdcBus;
use crate::publisher::{Measurement, Publisher, SensorEvent};
use crate::tracing::prelude::*;
use crate::types::Volts;

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Value admitted by the filter and published
    Published(Volts),
    /// Value read but inside the hysteresis band
    Suppressed(Volts),
    /// Read failed; channel marked unavailable
    ReadFailed,
    /// Pin and differential pin are equal; channel marked unavailable
    Misconfigured,
    /// Channel was detached while the read was in flight
    Discarded,
}

/// One channel's sampling loop and the state it owns.
pub struct ChannelSampler {
    config: ChannelConfig,
    identity: ChannelId,
    state: SamplingState,
    filter: ChangeFilter,
    bus: Arc<dyn AdcBus>,
    publisher: Arc<dyn Publisher>,
}

impl ChannelSampler {
    pub fn new(config: ChannelConfig, bus: Arc<dyn AdcBus>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            identity: config.identity(),
            config,
            state: SamplingState::new(),
            filter: ChangeFilter::default(),
            bus,
            publisher,
        }
    }

    pub fn state(&self) -> &SamplingState {
        &self.state
    }

    /// Run one read-filter-publish cycle.
    ///
    /// `live` is the channel's attachment token; once it is cancelled the
    /// cycle has no observable effect.
    pub async fn run_cycle(&mut self, live: &CancellationToken) -> CycleOutcome {
        if let Err(e) = self.config.check_pins() {
            error!(identity = %self.identity, "{}", e);
            self.set_available(false);
            return CycleOutcome::Misconfigured;
        }

        let result = adapter::read_voltage(self.bus.as_ref(), &self.config).await;

        if live.is_cancelled() {
            debug!(identity = %self.identity, "Channel detached during read, discarding");
            return CycleOutcome::Discarded;
        }

        match result {
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "Error while reading the sensor");
                self.set_available(false);
                CycleOutcome::ReadFailed
            }
            Ok(value) => {
                self.set_available(true);
                if self.filter.admit(&mut self.state, value) {
                    debug!(identity = %self.identity, value = %value, "Publishing");
                    self.publisher.publish(SensorEvent::Measurement(Measurement::voltage(
                        self.identity.clone(),
                        self.config.name.clone(),
                        value,
                    )));
                    CycleOutcome::Published(value)
                } else {
                    trace!(identity = %self.identity, value = %value, "Within hysteresis band");
                    CycleOutcome::Suppressed(value)
                }
            }
        }
    }

    /// Run cycles every `period` until `live` is cancelled.
    ///
    /// The first cycle runs immediately so a value is available without
    /// waiting a full period.
    pub async fn run(mut self, period: Duration, live: CancellationToken) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = live.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.run_cycle(&live).await == CycleOutcome::Discarded {
                break;
            }
        }

        debug!(identity = %self.identity, "Sampling stopped");
    }

    fn set_available(&mut self, available: bool) {
        if self.state.is_available() == available {
            return;
        }
        self.state.set_available(available);
        self.publisher.publish(SensorEvent::Availability {
            identity: self.identity.clone(),
            available,
        });
    }
}

/// Token returned by [`Sampler::attach`]; pass it back to detach.
#[derive(Debug)]
pub struct ChannelHandle {
    identity: ChannelId,
}

impl ChannelHandle {
    pub fn identity(&self) -> &ChannelId {
        &self.identity
    }
}

struct RunningChannel {
    live: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of attached channels and their sampling tasks.
pub struct Sampler {
    bus: Arc<dyn AdcBus>,
    publisher: Arc<dyn Publisher>,
    channels: Mutex<HashMap<ChannelId, RunningChannel>>,
    tracker: TaskTracker,
}

impl Sampler {
    pub fn new(bus: Arc<dyn AdcBus>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            bus,
            publisher,
            channels: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Validate `config` and start sampling it.
    ///
    /// Must be called from within a tokio runtime. Nothing is created when
    /// validation fails or a channel with the same identity is attached.
    pub fn attach(&self, config: ChannelConfig) -> Result<ChannelHandle, ConfigError> {
        config.validate()?;
        let period = config.sampling_period()?;
        let identity = config.identity();

        let mut channels = self.channels();
        if channels.contains_key(&identity) {
            return Err(ConfigError::DuplicateIdentity(identity));
        }

        config.log_settings();
        info!(
            identity = %identity,
            name = %config.name,
            ?period,
            "Channel attached"
        );

        let live = CancellationToken::new();
        let sampler = ChannelSampler::new(config, self.bus.clone(), self.publisher.clone());
        let task = self.tracker.spawn(sampler.run(period, live.clone()));
        channels.insert(identity.clone(), RunningChannel { live, task });

        Ok(ChannelHandle { identity })
    }

    /// Stop sampling a channel.
    ///
    /// When this returns the channel's task has exited and no further cycle
    /// will run or publish.
    pub async fn detach(&self, handle: ChannelHandle) {
        let running = self.channels().remove(&handle.identity);
        match running {
            Some(running) => {
                stop(&handle.identity, running).await;
                info!(identity = %handle.identity, "Channel detached");
            }
            None => debug!(identity = %handle.identity, "Channel already detached"),
        }
    }

    /// Identities of all attached channels.
    pub fn attached(&self) -> Vec<ChannelId> {
        self.channels().keys().cloned().collect()
    }

    /// Detach every channel and wait for all sampling tasks to exit.
    pub async fn shutdown(&self) {
        let running: Vec<_> = self.channels().drain().collect();
        for (_, channel) in &running {
            channel.live.cancel();
        }
        for (identity, channel) in running {
            stop(&identity, channel).await;
        }

        self.tracker.close();
        self.tracker.wait().await;
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<ChannelId, RunningChannel>> {
        // Nothing panics while holding the lock; recover the map if it ever does
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn stop(identity: &ChannelId, running: RunningChannel) {
    running.live.cancel();
    if let Err(e) = running.task.await {
        error!(identity = %identity, "Sampling task failed: {}", e);
    }
}
