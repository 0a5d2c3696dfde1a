//! ADS1115 16-bit delta-sigma ADC driver.
//!
//! The ADS1115 is an I2C converter with four inputs that can be measured
//! single-ended against ground or as one of four differential pairs, through
//! a programmable gain amplifier. This driver only uses single-shot mode: each
//! read starts one conversion, waits for it and fetches the result, leaving
//! the chip powered down between reads.
//!
//! Datasheet: <https://www.ti.com/lit/ds/symlink/ads1115.pdf>

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{self, Duration, Instant};

use crate::hw_trait::adc::{AdcBus, AdcChannel, ChannelSettings, InputLine};
use crate::hw_trait::i2c::{I2c, I2cBus};
use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;

/// Default I2C address for ADS1115 (ADDR pin tied to GND)
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// ADS1115 register pointers
pub mod regs {
    /// Conversion result register
    pub const CONVERSION: u8 = 0x00;
    /// Configuration register
    pub const CONFIG: u8 = 0x01;
}

/// Configuration register fields
pub mod config {
    /// Write: start a single conversion. Read: 1 when no conversion is running.
    pub const OS_SINGLE: u16 = 0x8000;
    /// Input multiplexer field offset
    pub const MUX_OFFSET: u16 = 12;
    /// Power-down single-shot mode
    pub const MODE_SINGLE: u16 = 0x0100;
    /// 128 samples per second (chip default)
    pub const DR_128SPS: u16 = 0x0080;
    /// Comparator disabled, ALERT/RDY high impedance
    pub const COMP_QUE_DISABLE: u16 = 0x0003;
}

/// Gain multiplier, PGA config bits and full-scale range in volts.
static PGA_TABLE: [(f64, u16, f64); 6] = [
    (2.0 / 3.0, 0x0000, 6.144),
    (1.0, 0x0200, 4.096),
    (2.0, 0x0400, 2.048),
    (4.0, 0x0600, 1.024),
    (8.0, 0x0800, 0.512),
    (16.0, 0x0A00, 0.256),
];

/// Differential pairs supported by the multiplexer and their MUX codes.
static DIFFERENTIAL_MUX: [((u8, u8), u16); 4] = [
    ((0, 1), 0b000),
    ((0, 3), 0b001),
    ((1, 3), 0b010),
    ((2, 3), 0b011),
];

/// Single-ended MUX codes start here (AIN0 vs GND = 0b100)
const SINGLE_ENDED_MUX_BASE: u16 = 0b100;

/// Number of inputs on the chip
const INPUT_COUNT: u8 = 4;

/// Positive full scale of the signed 16-bit result
const FULL_SCALE_COUNTS: f64 = 32767.0;

/// Conversion-ready polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Give up on a conversion after this long (one conversion at 128 SPS is ~8 ms)
const CONVERSION_TIMEOUT: Duration = Duration::from_millis(100);

/// Resolve the multiplexer code for an input and optional reference line.
pub fn mux_code(input: InputLine, reference: Option<InputLine>) -> Result<u16> {
    if input.0 >= INPUT_COUNT {
        return Err(HwError::InvalidParameter(format!(
            "ADS1115 has no input {}",
            input
        )));
    }

    match reference {
        None => Ok(SINGLE_ENDED_MUX_BASE + input.0 as u16),
        Some(reference) => DIFFERENTIAL_MUX
            .iter()
            .find(|((p, n), _)| *p == input.0 && *n == reference.0)
            .map(|(_, code)| *code)
            .ok_or_else(|| {
                HwError::InvalidParameter(format!(
                    "ADS1115 cannot measure {} against {}; supported pairs are \
                     AIN0-AIN1, AIN0-AIN3, AIN1-AIN3, AIN2-AIN3",
                    input, reference
                ))
            }),
    }
}

/// Resolve PGA config bits and full-scale range for a gain multiplier.
pub fn pga_setting(gain: f64) -> Result<(u16, f64)> {
    PGA_TABLE
        .iter()
        .find(|(multiplier, _, _)| (multiplier - gain).abs() < 1e-6)
        .map(|(_, bits, fsr)| (*bits, *fsr))
        .ok_or_else(|| HwError::InvalidParameter(format!("Unsupported ADS1115 gain {}", gain)))
}

/// Convert a raw conversion result to volts for the given full-scale range.
pub fn counts_to_volts(raw: i16, full_scale: f64) -> f64 {
    raw as f64 * full_scale / FULL_SCALE_COUNTS
}

/// ADS1115 driver bound to one input configuration
pub struct Ads1115<I: I2c> {
    i2c: I,
    address: u8,
    mux: u16,
    pga: u16,
    full_scale: f64,
}

impl<I: I2c> Ads1115<I> {
    /// Create a driver for `settings` on an already opened bus session.
    ///
    /// Fails without touching the bus when the settings cannot be expressed
    /// on this chip.
    pub fn new(i2c: I, settings: &ChannelSettings) -> Result<Self> {
        let mux = mux_code(settings.input, settings.reference)?;
        let (pga, full_scale) = pga_setting(settings.gain)?;

        Ok(Self {
            i2c,
            address: settings.address,
            mux,
            pga,
            full_scale,
        })
    }

    /// Config word that starts one single-shot conversion.
    pub fn single_shot_config(&self) -> u16 {
        config::OS_SINGLE
            | (self.mux << config::MUX_OFFSET)
            | self.pga
            | config::MODE_SINGLE
            | config::DR_128SPS
            | config::COMP_QUE_DISABLE
    }

    /// Run one conversion and return the raw signed result.
    pub async fn read_raw(&mut self) -> Result<i16> {
        let config = self.single_shot_config();
        self.write_register(regs::CONFIG, config).await?;
        self.wait_for_conversion().await?;

        let raw = self.read_register(regs::CONVERSION).await? as i16;
        trace!(
            "ADS1115@0x{:02X}: config=0x{:04X} raw={}",
            self.address,
            config,
            raw
        );
        Ok(raw)
    }

    async fn wait_for_conversion(&mut self) -> Result<()> {
        let deadline = Instant::now() + CONVERSION_TIMEOUT;
        loop {
            let status = self.read_register(regs::CONFIG).await?;
            if status & config::OS_SINGLE != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HwError::Timeout);
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    // Registers are 16 bits, most significant byte first

    async fn read_register(&mut self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    async fn write_register(&mut self, reg: u8, value: u16) -> Result<()> {
        let [high, low] = value.to_be_bytes();
        self.i2c.write(self.address, &[reg, high, low]).await
    }
}

#[async_trait]
impl<I: I2c> AdcChannel for Ads1115<I> {
    async fn read_voltage(&mut self) -> Result<f64> {
        let raw = self.read_raw().await?;
        Ok(counts_to_volts(raw, self.full_scale))
    }
}

/// [`AdcBus`] that opens a fresh I2C session for every channel it hands out.
///
/// A conversion is a config write, a wait and a result read. Another channel
/// writing the MUX in between would swap the result, so only one channel
/// handed out by this bus is open at a time. The next `open_channel` waits
/// until the previous channel is dropped.
pub struct Ads1115Bus<B: I2cBus> {
    bus: B,
    conversion: Arc<Mutex<()>>,
}

impl<B: I2cBus> Ads1115Bus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            conversion: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl<B: I2cBus> AdcBus for Ads1115Bus<B> {
    async fn open_channel(&self, settings: ChannelSettings) -> Result<Box<dyn AdcChannel>> {
        // Reject impossible settings before opening the bus
        mux_code(settings.input, settings.reference)?;
        pga_setting(settings.gain)?;

        let guard = self.conversion.clone().lock_owned().await;
        let session = self.bus.open().await?;
        let adc = Ads1115::new(session, &settings)?;
        Ok(Box::new(ExclusiveChannel { adc, _guard: guard }))
    }
}

/// Channel holding the bus's conversion lock until dropped.
struct ExclusiveChannel {
    adc: Ads1115<Box<dyn I2c>>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl AdcChannel for ExclusiveChannel {
    async fn read_voltage(&mut self) -> Result<f64> {
        self.adc.read_voltage().await
    }
}
