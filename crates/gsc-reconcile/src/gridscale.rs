//! gridscale-backed [`ServerApi`] implementation.
//!
//! Delegates to [`gs_api::Client`] for all HTTP calls and maps the wire
//! shapes into the engine's domain types.

use async_trait::async_trait;
use tracing::info;

use crate::types::{
    AttrUpdate, CreatePayload, HardwareProfile, IpAttachment, IpFamily, NetworkAttachment,
    PeripheralRef, ServerId, ServerState, StorageAttachment,
};
use crate::{Error, Result, ServerApi};

pub struct GridscaleApi {
    client: gs_api::Client,
}

impl GridscaleApi {
    pub fn new(client: gs_api::Client) -> Self {
        Self { client }
    }

    /// Create from env vars:
    ///
    /// - `GRIDSCALE_UUID` (required) account UUID
    /// - `GRIDSCALE_TOKEN` (required) API token
    /// - `GRIDSCALE_URL` (optional) non-default API endpoint
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let user_id = std::env::var("GRIDSCALE_UUID")
            .map_err(|_| Error::MissingEnv("GRIDSCALE_UUID".into()))?;
        let token = std::env::var("GRIDSCALE_TOKEN")
            .map_err(|_| Error::MissingEnv("GRIDSCALE_TOKEN".into()))?;

        let client = match std::env::var("GRIDSCALE_URL") {
            Ok(url) => gs_api::Client::with_base_url(user_id, token, url),
            Err(_) => gs_api::Client::new(user_id, token),
        };

        Ok(Self::new(client))
    }

    /// The underlying API client, for calls outside the reconciliation
    /// core (e.g. label CRUD).
    pub fn client(&self) -> &gs_api::Client {
        &self.client
    }
}

fn state_from_wire(server: gs_api::ServerProperties) -> ServerState {
    let relations = &server.relations;

    let storages = relations
        .storages
        .iter()
        .map(|s| StorageAttachment::new(s.object_uuid.clone(), s.bootdevice))
        .collect();

    // Only declared networks enter the state; the public network is the
    // plan builder's to manage.
    let networks = relations
        .networks
        .iter()
        .filter(|n| !n.public_net)
        .map(|n| NetworkAttachment {
            network: PeripheralRef::network(n.object_uuid.clone()),
            is_boot_device: n.bootdevice,
            firewall_template_id: n.firewall_template_uuid.clone(),
        })
        .collect();

    let mut ipv4 = None;
    let mut ipv6 = None;
    for ip in &relations.public_ips {
        match IpFamily::from_wire(ip.family) {
            Some(IpFamily::V4) => ipv4 = Some(IpAttachment::new(ip.object_uuid.clone(), IpFamily::V4)),
            Some(IpFamily::V6) => ipv6 = Some(IpAttachment::new(ip.object_uuid.clone(), IpFamily::V6)),
            None => {}
        }
    }

    // At most one ISO can be attached; the API reports a list anyway.
    let iso_image = relations
        .isoimages
        .last()
        .map(|iso| PeripheralRef::iso_image(iso.object_uuid.clone()));

    ServerState {
        id: ServerId(server.object_uuid),
        name: server.name,
        cores: server.cores,
        memory_gb: server.memory,
        hardware_profile: HardwareProfile::parse(&server.hardware_profile).unwrap_or_default(),
        availability_zone: server.availability_zone,
        labels: server.labels.into_iter().collect(),
        storages,
        networks,
        ipv4,
        ipv6,
        iso_image,
        power_on: server.power,
        current_price: server.current_price,
        console_token: server.console_token,
        usage_minutes_cores: server.usage_in_minutes_cores,
        usage_minutes_memory: server.usage_in_minutes_memory,
        auto_recovery: server.auto_recovery,
    }
}

fn create_request_from(payload: &CreatePayload) -> gs_api::ServerCreateRequest {
    let mut relations = gs_api::ServerCreateRelations::default();

    if let Some(boot) = &payload.boot_storage {
        relations.storages.push(gs_api::CreateStorageRelation {
            storage_uuid: boot.storage.object_id.clone(),
            bootdevice: true,
        });
    }

    if let Some(public) = &payload.public_network {
        relations.networks.push(gs_api::CreateNetworkRelation {
            network_uuid: public.object_id.clone(),
            bootdevice: false,
            firewall_template_uuid: None,
        });
    }
    for network in &payload.networks {
        relations.networks.push(gs_api::CreateNetworkRelation {
            network_uuid: network.network.object_id.clone(),
            bootdevice: network.is_boot_device,
            firewall_template_uuid: network.firewall_template_id.clone(),
        });
    }

    for ip in &payload.public_ips {
        relations.public_ips.push(gs_api::CreateIpRelation {
            ipaddr_uuid: ip.ip.object_id.clone(),
        });
    }

    if let Some(iso) = &payload.iso_image {
        relations.isoimages.push(gs_api::CreateIsoRelation {
            isoimage_uuid: iso.object_id.clone(),
        });
    }

    gs_api::ServerCreateRequest {
        name: payload.name.clone(),
        cores: payload.cores,
        memory: payload.memory_gb,
        hardware_profile: payload.hardware_profile.as_str().to_string(),
        location_uuid: payload.location_id.clone(),
        availability_zone: payload.availability_zone.clone(),
        labels: payload.labels.iter().cloned().collect(),
        relations,
    }
}

#[async_trait]
impl ServerApi for GridscaleApi {
    async fn fetch_state(&self, id: &ServerId) -> Result<Option<ServerState>> {
        match self.client.get_server(&id.0).await {
            Ok(resp) => Ok(Some(state_from_wire(resp.server))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_server(&self, payload: &CreatePayload) -> Result<ServerId> {
        let req = create_request_from(payload);
        let resp = self.client.create_server(&req).await?;
        info!(server_id = %resp.object_uuid, name = %payload.name, "gridscale: server created");
        Ok(ServerId(resp.object_uuid))
    }

    async fn update_attributes(&self, id: &ServerId, attrs: &AttrUpdate) -> Result<()> {
        self.client
            .update_server(
                &id.0,
                &gs_api::ServerUpdateRequest {
                    name: attrs.name.clone(),
                    cores: attrs.cores,
                    memory: attrs.memory_gb,
                    availability_zone: attrs.availability_zone.clone(),
                    labels: attrs.labels.iter().cloned().collect(),
                },
            )
            .await?;
        Ok(())
    }

    async fn shutdown(&self, id: &ServerId) -> Result<()> {
        self.client.shutdown_server(&id.0).await?;
        info!(server_id = %id, "gridscale: server stopped");
        Ok(())
    }

    async fn start(&self, id: &ServerId) -> Result<()> {
        self.client.start_server(&id.0).await?;
        info!(server_id = %id, "gridscale: server started");
        Ok(())
    }

    async fn delete_server(&self, id: &ServerId) -> Result<()> {
        self.client.delete_server(&id.0).await?;
        info!(server_id = %id, "gridscale: server deleted");
        Ok(())
    }

    async fn link_storage(&self, id: &ServerId, storage: &StorageAttachment) -> Result<()> {
        self.client
            .link_storage(
                &id.0,
                &gs_api::LinkStorageRequest {
                    object_uuid: storage.storage.object_id.clone(),
                    bootdevice: storage.is_boot_device,
                },
            )
            .await?;
        info!(server_id = %id, storage_id = %storage.storage.object_id, "gridscale: storage linked");
        Ok(())
    }

    async fn unlink_storage(&self, id: &ServerId, storage_id: &str) -> Result<()> {
        self.client.unlink_storage(&id.0, storage_id).await?;
        info!(server_id = %id, storage_id, "gridscale: storage unlinked");
        Ok(())
    }

    async fn link_network(&self, id: &ServerId, network: &NetworkAttachment) -> Result<()> {
        self.client
            .link_network(
                &id.0,
                &gs_api::LinkNetworkRequest {
                    object_uuid: network.network.object_id.clone(),
                    bootdevice: network.is_boot_device,
                    firewall_template_uuid: network.firewall_template_id.clone(),
                },
            )
            .await?;
        info!(server_id = %id, network_id = %network.network.object_id, "gridscale: network linked");
        Ok(())
    }

    async fn unlink_network(&self, id: &ServerId, network_id: &str) -> Result<()> {
        self.client.unlink_network(&id.0, network_id).await?;
        info!(server_id = %id, network_id, "gridscale: network unlinked");
        Ok(())
    }

    async fn link_ip(&self, id: &ServerId, ip: &IpAttachment) -> Result<()> {
        self.client
            .link_ip(
                &id.0,
                &gs_api::LinkIpRequest {
                    object_uuid: ip.ip.object_id.clone(),
                },
            )
            .await?;
        info!(server_id = %id, ip_id = %ip.ip.object_id, "gridscale: ip linked");
        Ok(())
    }

    async fn unlink_ip(&self, id: &ServerId, ip_id: &str) -> Result<()> {
        self.client.unlink_ip(&id.0, ip_id).await?;
        info!(server_id = %id, ip_id, "gridscale: ip unlinked");
        Ok(())
    }

    async fn link_iso(&self, id: &ServerId, iso_id: &str) -> Result<()> {
        self.client.link_isoimage(&id.0, iso_id).await?;
        info!(server_id = %id, iso_id, "gridscale: isoimage linked");
        Ok(())
    }

    async fn unlink_iso(&self, id: &ServerId, iso_id: &str) -> Result<()> {
        self.client.unlink_isoimage(&id.0, iso_id).await?;
        info!(server_id = %id, iso_id, "gridscale: isoimage unlinked");
        Ok(())
    }

    async fn resolve_public_network(&self) -> Result<PeripheralRef> {
        match self.client.get_public_network().await? {
            Some(network) => Ok(PeripheralRef::network(network.object_uuid)),
            None => Err(Error::NoPublicNetwork),
        }
    }

    async fn resolve_ip_family(&self, ip_id: &str) -> Result<IpFamily> {
        let ip = self.client.get_ip(ip_id).await?;
        IpFamily::from_wire(ip.family).ok_or_else(|| {
            Error::Payload(format!("ip {ip_id} reports address family {}", ip.family))
        })
    }
}
