//! Actuation layer: serial device protocol, OS input injection and the
//! dispatcher that arbitrates between them.

pub mod dispatch;
pub mod os;
pub mod packet;
pub mod protocol;
pub mod transport;

pub use dispatch::{ActuatorDispatch, Backend};
pub use os::{OsPointer, PointerBackend};
pub use packet::{ButtonEvent, LogicalButton};
pub use protocol::{ActuatorSession, DeviceProfile, SessionState};
pub use transport::{SerialTransport, SystemSerial, TransportFactory};
