//! Measurement publication.
//!
//! The sampling tasks hand admitted readings and availability changes to a
//! [`Publisher`]. Publishing never blocks the sampler: the host is expected
//! to buffer, and the default [`ChannelPublisher`] drops events when its
//! queue is full rather than wait.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::channel::ChannelId;
use crate::tracing::prelude::*;
use crate::types::Volts;

/// Unit of measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "V")]
    Volt,
}

/// What kind of quantity is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Voltage,
}

/// How successive values relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous reading, not a running total
    Measurement,
}

/// One admitted reading and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub identity: ChannelId,
    pub name: String,
    pub value: Volts,
    pub unit: Unit,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
}

impl Measurement {
    /// An instantaneous voltage measurement.
    pub fn voltage(identity: ChannelId, name: impl Into<String>, value: Volts) -> Self {
        Self {
            identity,
            name: name.into(),
            value,
            unit: Unit::Volt,
            device_class: DeviceClass::Voltage,
            state_class: StateClass::Measurement,
        }
    }
}

/// Events delivered to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SensorEvent {
    /// A reading passed the change filter
    Measurement(Measurement),

    /// The channel became available or unavailable
    Availability { identity: ChannelId, available: bool },
}

impl SensorEvent {
    pub fn identity(&self) -> &ChannelId {
        match self {
            SensorEvent::Measurement(m) => &m.identity,
            SensorEvent::Availability { identity, .. } => identity,
        }
    }
}

/// Sink for sensor events. Must not block.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: SensorEvent);
}

/// Publisher backed by a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<SensorEvent>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver the host drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SensorEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, event: SensorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(identity = %event.identity(), "Publish queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(identity = %event.identity(), "Publish queue closed, dropping event");
            }
        }
    }
}

/// Write each event as one JSON object per line until the channel closes.
pub async fn write_json_lines<W>(
    mut rx: mpsc::Receiver<SensorEvent>,
    mut out: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        match &event {
            SensorEvent::Measurement(m) => {
                debug!(identity = %m.identity, name = %m.name, value = %m.value, "Measurement");
            }
            SensorEvent::Availability {
                identity,
                available,
            } => {
                info!(identity = %identity, available, "Availability changed");
            }
        }

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Address, Pin};

    fn id() -> ChannelId {
        ChannelId::new(Address::Gnd, Pin::A0)
    }

    #[test]
    fn test_measurement_serialization() {
        let event = SensorEvent::Measurement(Measurement::voltage(id(), "Battery", Volts(1.25)));
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "event": "measurement",
                "identity": "0x48_A0",
                "name": "Battery",
                "value": 1.25,
                "unit": "V",
                "device_class": "voltage",
                "state_class": "measurement",
            })
        );
    }

    #[test]
    fn test_availability_serialization() {
        let event = SensorEvent::Availability {
            identity: id(),
            available: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"availability","identity":"0x48_A0","available":false}"#
        );
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let event = SensorEvent::Measurement(Measurement::voltage(id(), "a", Volts(1.0)));

        publisher.publish(event.clone());
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_channel_publisher_drops_when_full() {
        let (publisher, mut rx) = ChannelPublisher::new(1);
        let first = SensorEvent::Measurement(Measurement::voltage(id(), "a", Volts(1.0)));
        let second = SensorEvent::Measurement(Measurement::voltage(id(), "a", Volts(2.0)));

        publisher.publish(first.clone());
        publisher.publish(second);

        assert_eq!(rx.recv().await, Some(first));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_publisher_closed_is_silent() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);
        publisher.publish(SensorEvent::Availability {
            identity: id(),
            available: true,
        });
    }

    #[tokio::test]
    async fn test_write_json_lines() {
        let (publisher, rx) = ChannelPublisher::new(4);
        publisher.publish(SensorEvent::Availability {
            identity: id(),
            available: true,
        });
        publisher.publish(SensorEvent::Measurement(Measurement::voltage(
            id(),
            "a",
            Volts(0.5),
        )));
        drop(publisher);

        let mut out = Vec::new();
        write_json_lines(rx, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""event":"availability""#));
        assert!(lines[1].contains(r#""value":0.5"#));
    }
}
