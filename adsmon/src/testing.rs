//! In-memory hardware and host doubles for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::hw_trait::adc::{AdcBus, AdcChannel, ChannelSettings, InputLine};
use crate::hw_trait::i2c::{I2c, I2cBus, I2cError};
use crate::hw_trait::{HwError, Result};
use crate::peripheral::ads1115::{config, regs};
use crate::publisher::{Publisher, SensorEvent};
use crate::types::Volts;

/// Register-level model of an ADS1115 on an I2C bus.
#[derive(Clone)]
pub struct FakeAds1115 {
    state: Arc<Mutex<FakeAdsState>>,
}

struct FakeAdsState {
    address: u8,
    pointer: u8,
    config: u16,
    conversion: i16,
    mux_conversions: HashMap<u16, i16>,
    busy_polls: usize,
    busy_per_conversion: usize,
    config_writes: Vec<u16>,
    sessions_opened: usize,
    open_sessions: usize,
}

impl FakeAds1115 {
    pub fn new(address: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeAdsState {
                address,
                pointer: 0,
                config: 0x8583,
                conversion: 0,
                mux_conversions: HashMap::new(),
                busy_polls: 0,
                busy_per_conversion: 0,
                config_writes: Vec::new(),
                sessions_opened: 0,
                open_sessions: 0,
            })),
        }
    }

    pub fn bus(&self) -> FakeI2cBus {
        FakeI2cBus {
            state: self.state.clone(),
        }
    }

    pub fn set_conversion(&self, raw: i16) {
        self.state.lock().unwrap().conversion = raw;
    }

    /// Result a conversion started with MUX code `mux` latches into the
    /// conversion register.
    pub fn set_conversion_for_mux(&self, mux: u16, raw: i16) {
        self.state.lock().unwrap().mux_conversions.insert(mux, raw);
    }

    /// Make every started conversion stay busy for `polls` status reads.
    pub fn set_busy_polls_per_conversion(&self, polls: usize) {
        self.state.lock().unwrap().busy_per_conversion = polls;
    }

    /// Report a running conversion for the next `polls` status reads.
    /// `usize::MAX` never completes.
    pub fn set_busy_polls(&self, polls: usize) {
        self.state.lock().unwrap().busy_polls = polls;
    }

    pub fn config_writes(&self) -> Vec<u16> {
        self.state.lock().unwrap().config_writes.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions_opened
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }
}

pub struct FakeI2cBus {
    state: Arc<Mutex<FakeAdsState>>,
}

#[async_trait]
impl I2cBus for FakeI2cBus {
    async fn open(&self) -> Result<Box<dyn I2c>> {
        {
            let mut state = self.state.lock().unwrap();
            state.sessions_opened += 1;
            state.open_sessions += 1;
        }
        Ok(Box::new(FakeI2cSession {
            state: self.state.clone(),
        }))
    }

    fn name(&self) -> String {
        "fake".into()
    }
}

struct FakeI2cSession {
    state: Arc<Mutex<FakeAdsState>>,
}

impl Drop for FakeI2cSession {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_sessions -= 1;
    }
}

#[async_trait]
impl I2c for FakeI2cSession {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if addr != state.address {
            return Err(I2cError::NoAck(addr).into());
        }
        if let Some(&pointer) = data.first() {
            state.pointer = pointer;
        }
        if data.len() == 3 && data[0] == regs::CONFIG {
            let word = u16::from_be_bytes([data[1], data[2]]);
            state.config = word;
            state.config_writes.push(word);

            if word & config::OS_SINGLE != 0 {
                let mux = (word >> config::MUX_OFFSET) & 0b111;
                if let Some(&raw) = state.mux_conversions.get(&mux) {
                    state.conversion = raw;
                }
                if state.busy_per_conversion > 0 {
                    state.busy_polls = state.busy_per_conversion;
                }
            }
        }
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.write(addr, write).await?;
        self.read(addr, read)
    }
}

impl FakeI2cSession {
    fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if addr != state.address {
            return Err(I2cError::NoAck(addr).into());
        }
        let value = match state.pointer {
            regs::CONFIG => {
                if state.busy_polls > 0 {
                    if state.busy_polls != usize::MAX {
                        state.busy_polls -= 1;
                    }
                    state.config & !config::OS_SINGLE
                } else {
                    state.config | config::OS_SINGLE
                }
            }
            regs::CONVERSION => state.conversion as u16,
            other => {
                return Err(HwError::InvalidParameter(format!(
                    "no register 0x{:02x}",
                    other
                )))
            }
        };
        let bytes = value.to_be_bytes();
        let n = buffer.len().min(2);
        buffer[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }
}

type ReadHook = Arc<dyn Fn() + Send + Sync>;

/// ADC bus that replays a fixed list of read results.
///
/// Once the script is used up every read fails.
#[derive(Clone)]
pub struct ScriptedBus {
    inner: Arc<Mutex<ScriptedInner>>,
}

struct ScriptedInner {
    script: VecDeque<Result<f64>>,
    opened: Vec<ChannelSettings>,
    fail_open: bool,
    failing_inputs: Vec<InputLine>,
    read_delay: Option<Duration>,
    on_read: Option<ReadHook>,
    reads: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl ScriptedBus {
    pub fn new(script: impl IntoIterator<Item = Result<f64>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner {
                script: script.into_iter().collect(),
                opened: Vec::new(),
                fail_open: false,
                failing_inputs: Vec::new(),
                read_delay: None,
                on_read: None,
                reads: 0,
                in_flight: 0,
                max_in_flight: 0,
            })),
        }
    }

    pub fn fail_open(&self, fail: bool) {
        self.inner.lock().unwrap().fail_open = fail;
    }

    /// Fail every open of a channel measuring `input`.
    pub fn fail_input(&self, input: InputLine) {
        self.inner.lock().unwrap().failing_inputs.push(input);
    }

    /// Make every read take `delay` of tokio time.
    pub fn read_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().read_delay = Some(delay);
    }

    /// Run `hook` while a read is in progress.
    pub fn on_read(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().unwrap().on_read = Some(Arc::new(hook));
    }

    pub fn opened(&self) -> Vec<ChannelSettings> {
        self.inner.lock().unwrap().opened.clone()
    }

    pub fn reads(&self) -> usize {
        self.inner.lock().unwrap().reads
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl AdcBus for ScriptedBus {
    async fn open_channel(&self, settings: ChannelSettings) -> Result<Box<dyn AdcChannel>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_open || inner.failing_inputs.contains(&settings.input) {
            return Err(I2cError::NoAck(settings.address).into());
        }
        inner.opened.push(settings);
        Ok(Box::new(ScriptedChannel {
            inner: self.inner.clone(),
        }))
    }
}

struct ScriptedChannel {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[async_trait]
impl AdcChannel for ScriptedChannel {
    async fn read_voltage(&mut self) -> Result<f64> {
        let (delay, hook) = {
            let mut inner = self.inner.lock().unwrap();
            inner.reads += 1;
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            (inner.read_delay, inner.on_read.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = hook {
            hook();
        }

        let mut inner = self.inner.lock().unwrap();
        inner.in_flight -= 1;
        inner
            .script
            .pop_front()
            .unwrap_or_else(|| Err(HwError::Other("script exhausted".into())))
    }
}

/// Publisher that records everything it is given.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<SensorEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SensorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn measurements(&self) -> Vec<Volts> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SensorEvent::Measurement(m) => Some(m.value),
                _ => None,
            })
            .collect()
    }

    pub fn availability(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SensorEvent::Availability { available, .. } => Some(available),
                _ => None,
            })
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, event: SensorEvent) {
        self.events.lock().unwrap().push(event);
    }
}
