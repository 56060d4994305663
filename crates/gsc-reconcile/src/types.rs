use std::collections::BTreeSet;
use std::fmt;

/// Opaque remote server UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(pub String);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralKind {
    Storage,
    Network,
    PublicIp,
    IsoImage,
}

/// One attachable resource, identified by its remote object UUID.
/// Immutable once observed; equality is by id within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralRef {
    pub object_id: String,
    pub kind: PeripheralKind,
}

impl PeripheralRef {
    pub fn storage(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind: PeripheralKind::Storage,
        }
    }

    pub fn network(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind: PeripheralKind::Network,
        }
    }

    pub fn public_ip(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind: PeripheralKind::PublicIp,
        }
    }

    pub fn iso_image(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind: PeripheralKind::IsoImage,
        }
    }
}

/// Anything attachable whose identity is a remote object id. The differ
/// works purely over this identity.
pub trait Attached {
    fn object_id(&self) -> &str;
}

impl Attached for PeripheralRef {
    fn object_id(&self) -> &str {
        &self.object_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAttachment {
    pub storage: PeripheralRef,
    pub is_boot_device: bool,
}

impl StorageAttachment {
    pub fn new(object_id: impl Into<String>, is_boot_device: bool) -> Self {
        Self {
            storage: PeripheralRef::storage(object_id),
            is_boot_device,
        }
    }
}

impl Attached for StorageAttachment {
    fn object_id(&self) -> &str {
        &self.storage.object_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: PeripheralRef,
    pub is_boot_device: bool,
    pub firewall_template_id: Option<String>,
}

impl NetworkAttachment {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            network: PeripheralRef::network(object_id),
            is_boot_device: false,
            firewall_template_id: None,
        }
    }
}

impl Attached for NetworkAttachment {
    fn object_id(&self) -> &str {
        &self.network.object_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn from_wire(family: u8) -> Option<Self> {
        match family {
            4 => Some(Self::V4),
            6 => Some(Self::V6),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::V4 => 4,
            Self::V6 => 6,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("v4"),
            Self::V6 => f.write_str("v6"),
        }
    }
}

/// A public IP bound to one address family. A server holds at most one
/// attachment per family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAttachment {
    pub ip: PeripheralRef,
    pub family: IpFamily,
}

impl IpAttachment {
    pub fn new(object_id: impl Into<String>, family: IpFamily) -> Self {
        Self {
            ip: PeripheralRef::public_ip(object_id),
            family,
        }
    }
}

impl Attached for IpAttachment {
    fn object_id(&self) -> &str {
        &self.ip.object_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareProfile {
    #[default]
    Default,
    Legacy,
    Nested,
    CiscoCsr,
    SophosUtm,
    F5Bigip,
    Q35,
    Q35Nested,
}

impl HardwareProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Legacy => "legacy",
            Self::Nested => "nested",
            Self::CiscoCsr => "cisco_csr",
            Self::SophosUtm => "sophos_utm",
            Self::F5Bigip => "f5_bigip",
            Self::Q35 => "q35",
            Self::Q35Nested => "q35_nested",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "legacy" => Some(Self::Legacy),
            "nested" => Some(Self::Nested),
            "cisco_csr" => Some(Self::CiscoCsr),
            "sophos_utm" => Some(Self::SophosUtm),
            "f5_bigip" => Some(Self::F5Bigip),
            "q35" => Some(Self::Q35),
            "q35_nested" => Some(Self::Q35Nested),
            _ => None,
        }
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired configuration of one server. Caller-owned and immutable for the
/// duration of a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSpec {
    pub name: String,
    pub cores: u32,
    pub memory_gb: u32,
    pub hardware_profile: HardwareProfile,
    /// Datacenter placement, honored at creation only.
    pub location_id: Option<String>,
    pub availability_zone: Option<String>,
    pub labels: BTreeSet<String>,
    /// Ordered: additions are attached in this order.
    pub storages: Vec<StorageAttachment>,
    pub networks: Vec<NetworkAttachment>,
    pub ipv4: Option<IpAttachment>,
    pub ipv6: Option<IpAttachment>,
    pub iso_image: Option<PeripheralRef>,
    pub power_on: bool,
}

impl ServerSpec {
    /// The storage the instance boots from, if one is marked.
    pub fn boot_storage(&self) -> Option<&StorageAttachment> {
        self.storages.iter().find(|s| s.is_boot_device)
    }

    /// True when at least one public IP family is requested.
    pub fn has_public_ip(&self) -> bool {
        self.ipv4.is_some() || self.ipv6.is_some()
    }
}

/// Observed configuration of one server, fetched fresh at the start of a
/// pass. Never mutated; each read produces a new snapshot.
///
/// `networks` holds the declared (private) networks only: the
/// provider-managed public network is filtered out on read and handled
/// exclusively by the plan builder's auto-management step.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub id: ServerId,
    pub name: String,
    pub cores: u32,
    pub memory_gb: u32,
    pub hardware_profile: HardwareProfile,
    pub availability_zone: Option<String>,
    pub labels: BTreeSet<String>,
    pub storages: Vec<StorageAttachment>,
    pub networks: Vec<NetworkAttachment>,
    pub ipv4: Option<IpAttachment>,
    pub ipv6: Option<IpAttachment>,
    pub iso_image: Option<PeripheralRef>,
    pub power_on: bool,
    // Read-only accounting fields, reported but never diffed.
    pub current_price: f64,
    pub console_token: Option<String>,
    pub usage_minutes_cores: u64,
    pub usage_minutes_memory: u64,
    pub auto_recovery: bool,
}

/// The always-emitted attribute update. The remote no-ops fields that did
/// not change, so the engine never diffs these individually.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrUpdate {
    pub name: String,
    pub cores: u32,
    pub memory_gb: u32,
    pub availability_zone: Option<String>,
    pub labels: BTreeSet<String>,
}

impl AttrUpdate {
    pub fn from_spec(spec: &ServerSpec) -> Self {
        Self {
            name: spec.name.clone(),
            cores: spec.cores,
            memory_gb: spec.memory_gb,
            availability_zone: spec.availability_zone.clone(),
            labels: spec.labels.clone(),
        }
    }
}

/// Everything that rides the single create call. Secondary storages are
/// deliberately absent: they are deferred into the post-create plan so the
/// remote never has to guess a boot device.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePayload {
    pub name: String,
    pub cores: u32,
    pub memory_gb: u32,
    pub hardware_profile: HardwareProfile,
    pub location_id: Option<String>,
    pub availability_zone: Option<String>,
    pub labels: BTreeSet<String>,
    pub boot_storage: Option<StorageAttachment>,
    pub networks: Vec<NetworkAttachment>,
    pub public_network: Option<PeripheralRef>,
    pub public_ips: Vec<IpAttachment>,
    pub iso_image: Option<PeripheralRef>,
}
