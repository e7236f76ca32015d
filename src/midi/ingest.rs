use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::device::{DeviceConnection, DeviceDescriptor, MidiDeviceInterface, PacketReceiver};
use super::parser::parse_packet;
use crate::error::DeviceError;
use crate::events::{MidiEvent, MidiSource};
use crate::timing::{EventPool, StepQuantizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Opening,
    Connected,
    Closed,
}

/// Packet-side half of the ingest, shared with the device's input thread.
struct IngestSink {
    pool: Arc<EventPool>,
    quantizer: Arc<StepQuantizer>,
    source: MidiSource,
    accepting: AtomicBool,
}

impl PacketReceiver for IngestSink {
    fn on_packet_received(&self, bytes: &[u8], offset: usize, count: usize, timestamp: Instant) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        let Some(msg) = parse_packet(bytes, offset, count) else {
            return;
        };

        let step = self.quantizer.step_for(timestamp);
        let event = MidiEvent::new(
            msg.event_type,
            msg.note_number,
            msg.value,
            step,
            msg.channel,
            self.source,
            timestamp,
        );
        self.pool.enqueue(event);

        tracing::debug!(
            kind = ?msg.event_type,
            note = msg.note_number,
            value = msg.value,
            channel = msg.channel,
            step,
            "midi in"
        );
    }
}

/// Bridges one external MIDI input into the event pool.
///
/// Any failure to find or open a device leaves the ingest `Disconnected`
/// and the rest of the engine carries on without external input.
/// `Closed` is terminal.
pub struct HardwareIngest {
    devices: Box<dyn MidiDeviceInterface + Send>,
    sink: Arc<IngestSink>,
    preferred_device: Option<String>,
    enabled: bool,
    state: DeviceState,
    device: Option<DeviceDescriptor>,
    connection: Option<Box<dyn DeviceConnection>>,
}

impl HardwareIngest {
    pub fn new(
        devices: Box<dyn MidiDeviceInterface + Send>,
        pool: Arc<EventPool>,
        quantizer: Arc<StepQuantizer>,
    ) -> Self {
        Self {
            devices,
            sink: Arc::new(IngestSink {
                pool,
                quantizer,
                source: MidiSource::ExternalUsb,
                accepting: AtomicBool::new(false),
            }),
            preferred_device: None,
            enabled: true,
            state: DeviceState::Disconnected,
            device: None,
            connection: None,
        }
    }

    /// Prefer the first device whose name contains `name`.
    pub fn with_preferred_device(mut self, name: Option<String>) -> Self {
        self.preferred_device = name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Names of the inputs that could be opened right now.
    pub fn available_devices(&self) -> Vec<String> {
        match self.devices.list_devices() {
            Ok(devices) => devices.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                tracing::warn!("listing MIDI devices failed: {e}");
                Vec::new()
            }
        }
    }

    /// Tries to open an input. Never fails: the outcome is the new state.
    pub fn connect(&mut self) -> DeviceState {
        match self.state {
            DeviceState::Connected | DeviceState::Opening => return self.state,
            DeviceState::Closed => {
                tracing::warn!("MIDI ingest already released");
                return self.state;
            }
            DeviceState::Disconnected => {}
        }
        if !self.enabled {
            tracing::info!("external MIDI disabled");
            return self.state;
        }

        self.state = DeviceState::Opening;
        match self.open_preferred() {
            Ok((device, connection)) => {
                tracing::info!(device = %device.name, "MIDI input connected");
                self.device = Some(device);
                self.connection = Some(connection);
                self.sink.accepting.store(true, Ordering::Release);
                self.state = DeviceState::Connected;
            }
            Err(e) => {
                tracing::warn!("continuing without external MIDI: {e}");
                self.state = DeviceState::Disconnected;
            }
        }
        self.state
    }

    fn open_preferred(
        &self,
    ) -> Result<(DeviceDescriptor, Box<dyn DeviceConnection>), DeviceError> {
        let devices = self.devices.list_devices()?;
        let device = self
            .preferred_device
            .as_deref()
            .and_then(|wanted| devices.iter().find(|d| d.name.contains(wanted)))
            .or_else(|| devices.first())
            .cloned()
            .ok_or(DeviceError::NoDevices)?;

        tracing::debug!(device = %device.name, "opening MIDI input");
        let receiver: Arc<dyn PacketReceiver> = self.sink.clone();
        let connection = self.devices.open(&device, receiver)?;
        Ok((device, connection))
    }

    /// Entry point for raw packets, same as what an open device calls.
    pub fn on_packet_received(
        &self,
        bytes: &[u8],
        offset: usize,
        count: usize,
        timestamp: Instant,
    ) {
        self.sink.on_packet_received(bytes, offset, count, timestamp);
    }

    /// Stops ingest and closes the device. Safe from any state, repeatable.
    pub fn release(&mut self) {
        self.sink.accepting.store(false, Ordering::Release);
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        if self.state != DeviceState::Closed {
            tracing::info!("MIDI ingest released");
        }
        self.device = None;
        self.state = DeviceState::Closed;
    }
}

impl Drop for HardwareIngest {
    fn drop(&mut self) {
        self.release();
    }
}
