//! Topology model: addresses, devices, ports, edges and name-keyed rules.
//!
//! Numeric addresses are volatile: the kernel hands them out per session and
//! reuses them after hotplug. Only names are stable, so rules are keyed by
//! names and every address is resolved against a fresh snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Client number of the kernel's system pseudo-device.
pub const SYSTEM_CLIENT: u8 = 0;

/// Port of the system client that emits lifecycle announcements.
pub const ANNOUNCE_PORT: u8 = 1;

/// Transient `device:port` address, valid only within the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    #[serde(rename = "device_id")]
    pub device: u8,
    #[serde(rename = "port_id")]
    pub port: u8,
}

impl PortAddress {
    pub const fn new(device: u8, port: u8) -> Self {
        Self { device, port }
    }

    /// The system announcement endpoint, `0:1`.
    pub const fn announce() -> Self {
        Self::new(SYSTEM_CLIENT, ANNOUNCE_PORT)
    }

    pub fn is_system(&self) -> bool {
        self.device == SYSTEM_CLIENT
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.port)
    }
}

/// Port capability bits, using the kernel's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PortCaps(u32);

impl PortCaps {
    pub const NONE: PortCaps = PortCaps(0);
    pub const READ: PortCaps = PortCaps(1 << 0);
    pub const WRITE: PortCaps = PortCaps(1 << 1);
    pub const SUBS_READ: PortCaps = PortCaps(1 << 5);
    pub const SUBS_WRITE: PortCaps = PortCaps(1 << 6);

    /// Readable and writable, both subscribable. What this process opens.
    pub const DUPLEX_SUBS: PortCaps =
        PortCaps(Self::READ.0 | Self::WRITE.0 | Self::SUBS_READ.0 | Self::SUBS_WRITE.0);

    pub const fn from_bits(bits: u32) -> Self {
        PortCaps(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: PortCaps) -> bool {
        self.0 & other.0 == other.0
    }

    /// Subscribable read access: other ports can receive from this one.
    pub const fn is_input(self) -> bool {
        self.contains(PortCaps(Self::READ.0 | Self::SUBS_READ.0))
    }

    /// Subscribable write access: other ports can send to this one.
    pub const fn is_output(self) -> bool {
        self.contains(PortCaps(Self::WRITE.0 | Self::SUBS_WRITE.0))
    }
}

impl BitOr for PortCaps {
    type Output = PortCaps;

    fn bitor(self, rhs: Self) -> Self::Output {
        PortCaps(self.0 | rhs.0)
    }
}

impl BitOrAssign for PortCaps {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePort {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
}

impl DevicePort {
    pub fn from_caps(name: impl Into<String>, caps: PortCaps) -> Self {
        Self {
            name: name.into(),
            is_input: caps.is_input(),
            is_output: caps.is_output(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub ports: BTreeMap<u8, DevicePort>,
}

/// Immutable point-in-time view of the sequencer graph.
///
/// Rebuilt wholesale on every query; never patched. Any address read from a
/// snapshot may already be stale by the time it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    devices: BTreeMap<u8, Device>,
    #[serde(rename = "outputtoinput")]
    edges: BTreeMap<u8, BTreeMap<u8, Vec<PortAddress>>>,
    /// Set when some enumeration step failed and was skipped.
    #[serde(default)]
    partial: bool,
}

impl TopologySnapshot {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    pub fn devices(&self) -> &BTreeMap<u8, Device> {
        &self.devices
    }

    pub fn device(&self, device: u8) -> Option<&Device> {
        self.devices.get(&device)
    }

    pub fn port(&self, addr: PortAddress) -> Option<&DevicePort> {
        self.devices.get(&addr.device)?.ports.get(&addr.port)
    }

    /// `(device name, port name)` for a live address.
    pub fn names_of(&self, addr: PortAddress) -> Option<(&str, &str)> {
        let device = self.devices.get(&addr.device)?;
        let port = device.ports.get(&addr.port)?;
        Some((device.name.as_str(), port.name.as_str()))
    }

    /// First port (lowest address) whose device and port names match.
    pub fn find_port(&self, device_name: &str, port_name: &str) -> Option<PortAddress> {
        self.devices
            .iter()
            .filter(|(_, device)| device.name == device_name)
            .find_map(|(&device_id, device)| {
                device
                    .ports
                    .iter()
                    .find(|(_, port)| port.name == port_name)
                    .map(|(&port_id, _)| PortAddress::new(device_id, port_id))
            })
    }

    /// Every port address in the snapshot, in address order.
    pub fn ports(&self) -> impl Iterator<Item = PortAddress> + '_ {
        self.devices.iter().flat_map(|(&device_id, device)| {
            device
                .ports
                .keys()
                .map(move |&port_id| PortAddress::new(device_id, port_id))
        })
    }

    /// Destinations subscribed to `from`, in kernel order.
    pub fn destinations(&self, from: PortAddress) -> &[PortAddress] {
        self.edges
            .get(&from.device)
            .and_then(|ports| ports.get(&from.port))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, from: PortAddress, to: PortAddress) -> bool {
        self.destinations(from).contains(&to)
    }

    /// All `(source, destination)` edges.
    pub fn edges(&self) -> impl Iterator<Item = (PortAddress, PortAddress)> + '_ {
        self.edges.iter().flat_map(|(&device, ports)| {
            ports.iter().flat_map(move |(&port, dests)| {
                dests
                    .iter()
                    .map(move |&to| (PortAddress::new(device, port), to))
            })
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(|ports| ports.values())
            .map(Vec::len)
            .sum()
    }

    pub fn port_count(&self) -> usize {
        self.devices.values().map(|d| d.ports.len()).sum()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

/// Accumulates enumeration results into a [`TopologySnapshot`].
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    snapshot: TopologySnapshot,
}

impl TopologyBuilder {
    /// Registers a device. Re-registering keeps its ports and renames it.
    pub fn device(mut self, device: u8, name: impl Into<String>) -> Self {
        self.add_device(device, name);
        self
    }

    pub fn port(mut self, addr: PortAddress, port: DevicePort) -> Self {
        self.add_port(addr, port);
        self
    }

    pub fn edge(mut self, from: PortAddress, to: PortAddress) -> Self {
        self.add_edge(from, to);
        self
    }

    pub fn add_device(&mut self, device: u8, name: impl Into<String>) {
        let name = name.into();
        self.snapshot
            .devices
            .entry(device)
            .and_modify(|d| d.name.clone_from(&name))
            .or_insert_with(|| Device {
                name,
                ports: BTreeMap::new(),
            });
    }

    /// Adds a port; the owning device must have been added first.
    pub fn add_port(&mut self, addr: PortAddress, port: DevicePort) {
        if let Some(device) = self.snapshot.devices.get_mut(&addr.device) {
            device.ports.insert(addr.port, port);
        }
    }

    pub fn add_edge(&mut self, from: PortAddress, to: PortAddress) {
        self.snapshot
            .edges
            .entry(from.device)
            .or_default()
            .entry(from.port)
            .or_default()
            .push(to);
    }

    pub fn mark_partial(&mut self) {
        self.snapshot.partial = true;
    }

    pub fn build(self) -> TopologySnapshot {
        self.snapshot
    }
}

/// Durable routing intent, keyed by names so it survives renumbering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionRule {
    pub from_device: String,
    pub from_port: String,
    pub to_device: String,
    pub to_port: String,
}

impl ConnectionRule {
    pub fn new(
        from_device: impl Into<String>,
        from_port: impl Into<String>,
        to_device: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from_device: from_device.into(),
            from_port: from_port.into(),
            to_device: to_device.into(),
            to_port: to_port.into(),
        }
    }

    pub fn from_matches(&self, device: &str, port: &str) -> bool {
        self.from_device == device && self.from_port == port
    }

    pub fn to_matches(&self, device: &str, port: &str) -> bool {
        self.to_device == device && self.to_port == port
    }
}

impl fmt::Display for ConnectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} -> {}/{}",
            self.from_device, self.from_port, self.to_device, self.to_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TopologySnapshot {
        TopologySnapshot::builder()
            .device(0, "System")
            .port(
                PortAddress::new(0, 1),
                DevicePort::from_caps("Announce", PortCaps::READ),
            )
            .device(20, "Keystation")
            .port(
                PortAddress::new(20, 0),
                DevicePort::from_caps("Keystation MIDI 1", PortCaps::DUPLEX_SUBS),
            )
            .device(128, "FluidSynth")
            .port(
                PortAddress::new(128, 0),
                DevicePort::from_caps("Synth input port", PortCaps::WRITE | PortCaps::SUBS_WRITE),
            )
            .edge(PortAddress::new(20, 0), PortAddress::new(128, 0))
            .build()
    }

    #[test]
    fn test_caps_classification() {
        assert!(PortCaps::DUPLEX_SUBS.is_input());
        assert!(PortCaps::DUPLEX_SUBS.is_output());

        // Readable but not subscribable is not an input
        assert!(!PortCaps::READ.is_input());
        assert!(!(PortCaps::READ | PortCaps::SUBS_WRITE).is_input());

        let write_only = PortCaps::WRITE | PortCaps::SUBS_WRITE;
        assert!(write_only.is_output());
        assert!(!write_only.is_input());
    }

    #[test]
    fn test_name_resolution() {
        let snap = sample();

        assert_eq!(
            snap.names_of(PortAddress::new(20, 0)),
            Some(("Keystation", "Keystation MIDI 1"))
        );
        assert_eq!(snap.names_of(PortAddress::new(21, 0)), None);
        assert_eq!(snap.names_of(PortAddress::new(20, 5)), None);

        assert_eq!(
            snap.find_port("FluidSynth", "Synth input port"),
            Some(PortAddress::new(128, 0))
        );
        assert_eq!(snap.find_port("FluidSynth", "Missing"), None);
    }

    #[test]
    fn test_find_port_prefers_lowest_address() {
        let snap = TopologySnapshot::builder()
            .device(24, "Launchpad")
            .port(
                PortAddress::new(24, 0),
                DevicePort::from_caps("MIDI 1", PortCaps::DUPLEX_SUBS),
            )
            .device(20, "Launchpad")
            .port(
                PortAddress::new(20, 0),
                DevicePort::from_caps("MIDI 1", PortCaps::DUPLEX_SUBS),
            )
            .build();

        assert_eq!(
            snap.find_port("Launchpad", "MIDI 1"),
            Some(PortAddress::new(20, 0))
        );
    }

    #[test]
    fn test_edges() {
        let snap = sample();
        let from = PortAddress::new(20, 0);
        let to = PortAddress::new(128, 0);

        assert!(snap.is_connected(from, to));
        assert!(!snap.is_connected(to, from));
        assert_eq!(snap.destinations(from), &[to]);
        assert!(snap.destinations(to).is_empty());
        assert_eq!(snap.edge_count(), 1);
        assert_eq!(snap.edges().collect::<Vec<_>>(), vec![(from, to)]);
    }

    #[test]
    fn test_ports_iteration_order() {
        let snap = sample();
        let ports: Vec<_> = snap.ports().collect();
        assert_eq!(
            ports,
            vec![
                PortAddress::new(0, 1),
                PortAddress::new(20, 0),
                PortAddress::new(128, 0)
            ]
        );
        assert_eq!(snap.port_count(), 3);
        assert!(!snap.is_partial());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = sample();
        let json = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["devices"]["20"]["name"], "Keystation");
        assert_eq!(json["devices"]["20"]["ports"]["0"]["is_input"], true);
        assert_eq!(json["outputtoinput"]["20"]["0"][0]["device_id"], 128);
        assert_eq!(json["outputtoinput"]["20"]["0"][0]["port_id"], 0);

        let back: TopologySnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_rule_matching() {
        let rule = ConnectionRule::new("A", "Out", "B", "In");
        assert!(rule.from_matches("A", "Out"));
        assert!(!rule.from_matches("B", "In"));
        assert!(rule.to_matches("B", "In"));
        assert_eq!(rule.to_string(), "A/Out -> B/In");
    }
}
