//! TOML manifest describing one desired server.
//!
//! ```toml
//! name = "web-1"
//! cores = 2
//! memory_gb = 4
//! power_on = true
//! labels = ["env:prod"]
//! ipv4 = "1b180f9f-aa5a-44e4-9cd5-a3a724EXAMPLE"
//!
//! [[storage]]
//! id = "9f441f3a-7b19-4e2a-a373-4c1d71EXAMPLE"
//! boot = true
//!
//! [[network]]
//! id = "0a9256dd-66e5-4a57-9c9e-2f0a23EXAMPLE"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use gsc_reconcile::types::{
    HardwareProfile, IpAttachment, IpFamily, NetworkAttachment, PeripheralRef, ServerSpec,
    StorageAttachment,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerManifest {
    name: String,
    cores: u32,
    memory_gb: u32,
    #[serde(default)]
    hardware_profile: Option<String>,
    #[serde(default)]
    location_id: Option<String>,
    #[serde(default)]
    availability_zone: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default, rename = "storage")]
    storages: Vec<StorageEntry>,
    #[serde(default, rename = "network")]
    networks: Vec<NetworkEntry>,
    #[serde(default)]
    ipv4: Option<String>,
    #[serde(default)]
    ipv6: Option<String>,
    #[serde(default)]
    iso_image: Option<String>,
    #[serde(default)]
    power_on: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StorageEntry {
    id: String,
    #[serde(default)]
    boot: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkEntry {
    id: String,
    #[serde(default)]
    boot: bool,
    #[serde(default)]
    firewall_template: Option<String>,
}

pub fn load(path: &Path) -> Result<ServerSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest: ServerManifest =
        toml::from_str(&raw).with_context(|| format!("parsing manifest {}", path.display()))?;
    manifest.into_spec()
}

impl ServerManifest {
    fn into_spec(self) -> Result<ServerSpec> {
        let hardware_profile = match self.hardware_profile.as_deref() {
            None => HardwareProfile::default(),
            Some(raw) => HardwareProfile::parse(raw)
                .with_context(|| format!("unknown hardware profile {raw:?}"))?,
        };

        Ok(ServerSpec {
            name: self.name,
            cores: self.cores,
            memory_gb: self.memory_gb,
            hardware_profile,
            location_id: self.location_id,
            availability_zone: self.availability_zone,
            labels: self.labels.into_iter().collect(),
            storages: self
                .storages
                .into_iter()
                .map(|s| StorageAttachment::new(s.id, s.boot))
                .collect(),
            networks: self
                .networks
                .into_iter()
                .map(|n| NetworkAttachment {
                    network: PeripheralRef::network(n.id),
                    is_boot_device: n.boot,
                    firewall_template_id: n.firewall_template,
                })
                .collect(),
            ipv4: self.ipv4.map(|id| IpAttachment::new(id, IpFamily::V4)),
            ipv6: self.ipv6.map(|id| IpAttachment::new(id, IpFamily::V6)),
            iso_image: self.iso_image.map(PeripheralRef::iso_image),
            power_on: self.power_on,
        })
    }
}
