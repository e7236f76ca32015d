use std::sync::Arc;
use std::time::Instant;

use midir::{MidiInput, MidiInputConnection};

use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
}

/// Where an open device delivers its raw packets.
pub trait PacketReceiver: Send + Sync {
    fn on_packet_received(&self, bytes: &[u8], offset: usize, count: usize, timestamp: Instant);
}

/// An open device. Dropping the box also disconnects.
pub trait DeviceConnection {
    fn close(self: Box<Self>);
}

/// Boundary to whatever enumerates and opens MIDI hardware.
pub trait MidiDeviceInterface {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    fn open(
        &self,
        device: &DeviceDescriptor,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<Box<dyn DeviceConnection>, DeviceError>;
}

/// System MIDI inputs through midir.
pub struct MidirDevices {
    client_name: String,
}

impl MidirDevices {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn client(&self) -> Result<MidiInput, DeviceError> {
        MidiInput::new(&self.client_name).map_err(|e| DeviceError::Init(e.to_string()))
    }
}

impl Default for MidirDevices {
    fn default() -> Self {
        Self::new("stepwire")
    }
}

impl MidiDeviceInterface for MidirDevices {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let midi_in = self.client()?;
        let devices = midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| DeviceDescriptor { index, name })
            })
            .collect();
        Ok(devices)
    }

    fn open(
        &self,
        device: &DeviceDescriptor,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<Box<dyn DeviceConnection>, DeviceError> {
        let midi_in = self.client()?;
        let ports = midi_in.ports();

        // Ports may have been renumbered since enumeration, so match by name.
        let port = ports
            .iter()
            .find(|p| midi_in.port_name(p).ok().as_deref() == Some(device.name.as_str()))
            .cloned()
            .ok_or_else(|| DeviceError::Missing(device.name.clone()))?;

        let connection = midi_in
            .connect(
                &port,
                "stepwire-input",
                move |_stamp, message, _| {
                    receiver.on_packet_received(message, 0, message.len(), Instant::now());
                },
                (),
            )
            .map_err(|e| DeviceError::Open {
                name: device.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirConnection(connection)))
    }
}

struct MidirConnection(MidiInputConnection<()>);

impl DeviceConnection for MidirConnection {
    fn close(self: Box<Self>) {
        let _ = self.0.close();
    }
}
