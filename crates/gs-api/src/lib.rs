//! Typed Rust client for the gridscale public API.
//!
//! Covers the subset needed for converging servers: server CRUD and power
//! control, peripheral link/unlink (storages, networks, public IPs, ISO
//! images), the public-network and IP lookups, and label CRUD.

mod types;

pub use types::*;

const BASE_URL: &str = "https://api.gridscale.io";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("gridscale api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gridscale api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// True when the remote answered 404 for the addressed object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status, .. } if status.as_u16() == 404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the gridscale REST API.
///
/// Authentication uses the account UUID plus an API token, sent as the
/// `X-Auth-UserID` / `X-Auth-Token` header pair on every request.
#[derive(Clone)]
pub struct Client {
    user_id: String,
    token: String,
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_base_url(user_id, token, BASE_URL)
    }

    /// Point the client at a non-default API endpoint (e.g. a test stub).
    pub fn with_base_url(
        user_id: impl Into<String>,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("X-Auth-UserID", &self.user_id)
            .header("X-Auth-Token", &self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(
        resp: reqwest::Response,
        endpoint: &'static str,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    // ── Servers ─────────────────────────────────────────────────────

    pub async fn get_server(&self, server_id: &str) -> Result<ServerResponse> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/objects/servers/{server_id}"))
            .send()
            .await?;

        Self::check(resp, "get server")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn create_server(&self, req: &ServerCreateRequest) -> Result<CreateResponse> {
        let resp = self
            .request(reqwest::Method::POST, "/objects/servers")
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create server")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn update_server(&self, server_id: &str, req: &ServerUpdateRequest) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PATCH, &format!("/objects/servers/{server_id}"))
            .json(req)
            .send()
            .await?;

        Self::check(resp, "update server").await?;
        Ok(())
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/objects/servers/{server_id}"))
            .send()
            .await?;

        Self::check_allow_404(resp, "delete server").await?;
        Ok(())
    }

    pub async fn start_server(&self, server_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/objects/servers/{server_id}/power"),
            )
            .json(&PowerUpdateRequest { power: true })
            .send()
            .await?;

        Self::check(resp, "start server").await?;
        Ok(())
    }

    /// ACPI shutdown. The remote treats an already-stopped server as
    /// success, so callers never have to check the power state first.
    pub async fn shutdown_server(&self, server_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/objects/servers/{server_id}/shutdown"),
            )
            .json(&serde_json::json!({}))
            .send()
            .await?;

        Self::check(resp, "shutdown server").await?;
        Ok(())
    }

    // ── Storages ────────────────────────────────────────────────────

    pub async fn link_storage(&self, server_id: &str, req: &LinkStorageRequest) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/objects/servers/{server_id}/storages"),
            )
            .json(req)
            .send()
            .await?;

        Self::check(resp, "link storage").await?;
        Ok(())
    }

    pub async fn unlink_storage(&self, server_id: &str, storage_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/objects/servers/{server_id}/storages/{storage_id}"),
            )
            .send()
            .await?;

        Self::check(resp, "unlink storage").await?;
        Ok(())
    }

    // ── Networks ────────────────────────────────────────────────────

    pub async fn link_network(&self, server_id: &str, req: &LinkNetworkRequest) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/objects/servers/{server_id}/networks"),
            )
            .json(req)
            .send()
            .await?;

        Self::check(resp, "link network").await?;
        Ok(())
    }

    pub async fn unlink_network(&self, server_id: &str, network_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/objects/servers/{server_id}/networks/{network_id}"),
            )
            .send()
            .await?;

        Self::check(resp, "unlink network").await?;
        Ok(())
    }

    pub async fn list_networks(&self) -> Result<Vec<NetworkProperties>> {
        let resp = self
            .request(reqwest::Method::GET, "/objects/networks")
            .send()
            .await?;

        let list: NetworkListResponse = Self::check(resp, "list networks").await?.json().await?;
        Ok(list.networks.into_values().collect())
    }

    /// The provider-managed network that public IPs ride on, if the
    /// account has one.
    pub async fn get_public_network(&self) -> Result<Option<NetworkProperties>> {
        Ok(self
            .list_networks()
            .await?
            .into_iter()
            .find(|n| n.public_net))
    }

    // ── Public IPs ──────────────────────────────────────────────────

    pub async fn link_ip(&self, server_id: &str, req: &LinkIpRequest) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/objects/servers/{server_id}/ips"),
            )
            .json(req)
            .send()
            .await?;

        Self::check(resp, "link ip").await?;
        Ok(())
    }

    pub async fn unlink_ip(&self, server_id: &str, ip_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/objects/servers/{server_id}/ips/{ip_id}"),
            )
            .send()
            .await?;

        Self::check(resp, "unlink ip").await?;
        Ok(())
    }

    pub async fn get_ip(&self, ip_id: &str) -> Result<IpProperties> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/objects/ips/{ip_id}"))
            .send()
            .await?;

        let ip: IpResponse = Self::check(resp, "get ip").await?.json().await?;
        Ok(ip.ip)
    }

    // ── ISO images ──────────────────────────────────────────────────

    pub async fn link_isoimage(&self, server_id: &str, iso_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/objects/servers/{server_id}/isoimages"),
            )
            .json(&LinkIsoImageRequest {
                object_uuid: iso_id.to_string(),
            })
            .send()
            .await?;

        Self::check(resp, "link isoimage").await?;
        Ok(())
    }

    pub async fn unlink_isoimage(&self, server_id: &str, iso_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/objects/servers/{server_id}/isoimages/{iso_id}"),
            )
            .send()
            .await?;

        Self::check(resp, "unlink isoimage").await?;
        Ok(())
    }

    // ── Labels ──────────────────────────────────────────────────────

    pub async fn list_labels(&self) -> Result<Vec<LabelProperties>> {
        let resp = self
            .request(reqwest::Method::GET, "/objects/labels")
            .send()
            .await?;

        let list: LabelListResponse = Self::check(resp, "list labels").await?.json().await?;
        Ok(list.labels.into_values().collect())
    }

    pub async fn create_label(&self, label: &str) -> Result<CreateResponse> {
        let resp = self
            .request(reqwest::Method::POST, "/objects/labels")
            .json(&LabelCreateRequest {
                label: label.to_string(),
            })
            .send()
            .await?;

        Self::check(resp, "create label")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn delete_label(&self, label: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/objects/labels/{label}"))
            .send()
            .await?;

        Self::check_allow_404(resp, "delete label").await?;
        Ok(())
    }
}
