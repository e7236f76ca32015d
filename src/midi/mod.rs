mod device;
mod ingest;
mod parser;

pub use device::{
    DeviceConnection, DeviceDescriptor, MidiDeviceInterface, MidirDevices, PacketReceiver,
};
pub use ingest::{DeviceState, HardwareIngest};
pub use parser::{ParsedMessage, parse_message, parse_packet};
