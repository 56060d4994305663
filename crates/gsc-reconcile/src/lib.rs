//! Convergence engine for gridscale cloud servers.
//!
//! Given a desired [`types::ServerSpec`] and an observed
//! [`types::ServerState`], the engine decides whether a power-cycle is
//! needed, computes the attach/detach delta for every peripheral
//! collection, orders the resulting operations into a [`plan::Plan`], and
//! executes that plan against a [`ServerApi`] implementation one call at a
//! time.
//!
//! Reconciliation of one server is single-writer: the caller serializes
//! passes against the same server identity, and nothing is shared between
//! passes; all state flows through the immutable spec/state/plan values.

pub mod diff;
pub mod exec;
pub mod gridscale;
pub mod plan;
pub mod types;

use async_trait::async_trait;

use crate::types::{
    AttrUpdate, CreatePayload, IpAttachment, IpFamily, NetworkAttachment, PeripheralRef, ServerId,
    ServerState, StorageAttachment,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The desired spec violates an invariant. Raised before anything is
    /// sent to the remote.
    #[error("invalid server spec: {0}")]
    Validation(String),

    #[error("gridscale api error: {0}")]
    Api(#[from] gs_api::Error),

    /// Plan execution stopped at `op`. Earlier operations stay applied;
    /// the next pass resumes from whatever the remote now holds.
    #[error("{op}: {source}")]
    Operation {
        op: String,
        #[source]
        source: Box<Error>,
    },

    /// The remote answered with a shape the engine cannot use.
    #[error("unexpected api payload: {0}")]
    Payload(String),

    #[error("no public network available")]
    NoPublicNetwork,

    #[error("missing env var: {0}")]
    MissingEnv(String),
}

impl Error {
    /// True when the underlying cause is the remote not knowing the
    /// addressed object (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api(e) => e.is_not_found(),
            Error::Operation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Remote side of the reconciliation engine.
///
/// One method per remote call. Each call is idempotent on retry; retry and
/// backoff live behind the implementation, never in the engine. `shutdown`
/// on a stopped server and `start` on a running one are no-ops on the
/// remote side, so the engine never re-checks the power state before
/// issuing them.
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// `Ok(None)` means the server no longer exists remotely, a valid
    /// outcome rather than a fault.
    async fn fetch_state(&self, id: &ServerId) -> Result<Option<ServerState>>;

    async fn create_server(&self, payload: &CreatePayload) -> Result<ServerId>;

    async fn update_attributes(&self, id: &ServerId, attrs: &AttrUpdate) -> Result<()>;

    async fn shutdown(&self, id: &ServerId) -> Result<()>;

    async fn start(&self, id: &ServerId) -> Result<()>;

    async fn delete_server(&self, id: &ServerId) -> Result<()>;

    async fn link_storage(&self, id: &ServerId, storage: &StorageAttachment) -> Result<()>;

    async fn unlink_storage(&self, id: &ServerId, storage_id: &str) -> Result<()>;

    async fn link_network(&self, id: &ServerId, network: &NetworkAttachment) -> Result<()>;

    async fn unlink_network(&self, id: &ServerId, network_id: &str) -> Result<()>;

    async fn link_ip(&self, id: &ServerId, ip: &IpAttachment) -> Result<()>;

    async fn unlink_ip(&self, id: &ServerId, ip_id: &str) -> Result<()>;

    async fn link_iso(&self, id: &ServerId, iso_id: &str) -> Result<()>;

    async fn unlink_iso(&self, id: &ServerId, iso_id: &str) -> Result<()>;

    /// The provider-managed network that public IPs ride on.
    async fn resolve_public_network(&self) -> Result<PeripheralRef>;

    async fn resolve_ip_family(&self, ip_id: &str) -> Result<IpFamily>;
}
