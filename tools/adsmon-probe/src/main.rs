//! Read an ADS1115 channel from the command line.
//!
//! Uses the same configuration labels and read path as the daemon, without
//! the change filter, so every sample is printed.

use std::path::PathBuf;
use std::time::Duration;

use adsmon::adapter;
use adsmon::channel::{Address, ChannelConfig, DifferentialPin, Gain, Pin};
use adsmon::peripheral::Ads1115Bus;
use adsmon::transport::LinuxI2cBus;
use anyhow::{Context, Result};
use clap::Parser;

/// One-shot ADS1115 reader for bench checks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// i2c-dev device the converter is on
    #[arg(short, long, default_value = adsmon::config::DEFAULT_BUS_PATH)]
    bus: PathBuf,

    /// Converter address (0x48, 0x49, 0x4A, 0x4B)
    #[arg(short, long, default_value = "0x48")]
    address: Address,

    /// Measured pin (A0..A3)
    #[arg(short, long, default_value = "A0")]
    pin: Pin,

    /// Reference pin (GND for single-ended, A0..A3)
    #[arg(short = 'r', long, default_value = "GND")]
    differential_pin: DifferentialPin,

    /// Full-scale range (6.144V, 4.096V, 2.048V, 1.024V, 0.512V, 0.256V)
    #[arg(short, long, default_value = "4.096V")]
    gain: Gain,

    /// Number of samples to take
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Seconds between samples
    #[arg(short, long, default_value_t = 1.0)]
    interval: f64,

    /// Print the resolved driver settings before reading
    #[arg(long)]
    dump: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("adsmon=debug".parse()?),
            )
            .init();
    }

    let config = ChannelConfig::new(
        "probe",
        args.address,
        args.pin,
        args.differential_pin,
        args.gain,
    )
    .with_update_interval(args.interval);
    config.validate().context("Invalid channel settings")?;
    let period = config.sampling_period()?;

    if args.dump {
        let settings = config.settings();
        println!("identity:         {}", config.identity());
        println!("bus:              {}", args.bus.display());
        println!("address:          {} (0x{:02X})", config.address, settings.address);
        println!("pin:              {} ({})", config.pin, settings.input);
        match settings.reference {
            Some(line) => println!("differential_pin: {} ({})", config.differential_pin, line),
            None => println!("differential_pin: {} (single-ended)", config.differential_pin),
        }
        println!("gain:             {} (x{:.3})", config.gain, settings.gain);
        config.log_settings();
    }

    let bus = Ads1115Bus::new(LinuxI2cBus::new(&args.bus));
    for n in 0..args.count {
        if n > 0 {
            tokio::time::sleep(period).await;
        }
        let volts = adapter::read_voltage(&bus, &config)
            .await
            .with_context(|| format!("Read from {} failed", config.identity()))?;
        println!("{} {}", config.identity(), volts);
    }

    Ok(())
}
