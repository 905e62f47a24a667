mod registry;

pub use registry::{PortListener, PortRegistry, RegisteredPort, RegisteredPortInfo};
