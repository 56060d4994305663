use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Servers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse {
    pub server: ServerProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerProperties {
    pub object_uuid: String,
    pub name: String,
    pub cores: u32,
    pub memory: u32,
    #[serde(default)]
    pub hardware_profile: String,
    #[serde(default)]
    pub power: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub legacy: bool,
    #[serde(default)]
    pub location_uuid: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub console_token: Option<String>,
    #[serde(default)]
    pub auto_recovery: bool,
    #[serde(default)]
    pub usage_in_minutes_cores: u64,
    #[serde(default)]
    pub usage_in_minutes_memory: u64,
    #[serde(default)]
    pub relations: ServerRelations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerRelations {
    #[serde(default)]
    pub storages: Vec<ServerStorageRelation>,
    #[serde(default)]
    pub networks: Vec<ServerNetworkRelation>,
    #[serde(default)]
    pub public_ips: Vec<ServerIpRelation>,
    #[serde(default)]
    pub isoimages: Vec<ServerIsoRelation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerStorageRelation {
    pub object_uuid: String,
    #[serde(default)]
    pub bootdevice: bool,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub capacity: Option<u64>,
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerNetworkRelation {
    pub object_uuid: String,
    #[serde(default)]
    pub bootdevice: bool,
    #[serde(default)]
    pub public_net: bool,
    #[serde(default)]
    pub firewall_template_uuid: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub ordering: Option<i64>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerIpRelation {
    pub object_uuid: String,
    pub family: u8,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerIsoRelation {
    pub object_uuid: String,
    #[serde(default)]
    pub object_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCreateRequest {
    pub name: String,
    pub cores: u32,
    pub memory: u32,
    pub hardware_profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub relations: ServerCreateRelations,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCreateRelations {
    pub storages: Vec<CreateStorageRelation>,
    pub networks: Vec<CreateNetworkRelation>,
    pub public_ips: Vec<CreateIpRelation>,
    pub isoimages: Vec<CreateIsoRelation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateStorageRelation {
    pub storage_uuid: String,
    pub bootdevice: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNetworkRelation {
    pub network_uuid: String,
    pub bootdevice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_template_uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIpRelation {
    pub ipaddr_uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIsoRelation {
    pub isoimage_uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerUpdateRequest {
    pub name: String,
    pub cores: u32,
    pub memory: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerUpdateRequest {
    pub power: bool,
}

/// Response of every object-creating POST.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    pub object_uuid: String,
    #[serde(default)]
    pub request_uuid: Option<String>,
}

// ── Peripheral link requests ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LinkStorageRequest {
    pub object_uuid: String,
    pub bootdevice: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkNetworkRequest {
    pub object_uuid: String,
    pub bootdevice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_template_uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkIpRequest {
    pub object_uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkIsoImageRequest {
    pub object_uuid: String,
}

// ── Networks ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkListResponse {
    pub networks: HashMap<String, NetworkProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkProperties {
    pub object_uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_net: bool,
}

// ── IPs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IpResponse {
    pub ip: IpProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpProperties {
    pub object_uuid: String,
    pub family: u8,
    #[serde(default)]
    pub ip: Option<String>,
}

// ── Labels ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LabelListResponse {
    pub labels: HashMap<String, LabelProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelProperties {
    pub label: String,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelCreateRequest {
    pub label: String,
}
