//! Plan execution and the reconcile/create/delete entry points.
//!
//! Operations are issued strictly one at a time: later steps depend on
//! earlier ones having landed, and the remote does not guarantee safe
//! concurrent mutation of one server's peripheral set. Dropping the
//! future (or wrapping it in a timeout) between calls stops further
//! operations without undoing applied ones.

use tracing::{info, warn};

use crate::plan::{self, Operation, Plan};
use crate::types::{CreatePayload, ServerId, ServerSpec, ServerState};
use crate::{Error, Result, ServerApi};

/// Run every operation in order, stopping at the first failure.
///
/// The failing operation's identity is folded into the returned error. No
/// rollback is attempted: the remote resource is the durable source of
/// truth and the next pass resumes from it. A 404 on the server mid-plan
/// means it vanished underneath us: terminal success, nothing left to
/// converge.
pub async fn execute_plan(api: &dyn ServerApi, id: &ServerId, plan: Plan) -> Result<()> {
    for op in plan.into_operations() {
        let label = op.to_string();
        let outcome = match &op {
            Operation::Shutdown => api.shutdown(id).await,
            Operation::Start => api.start(id).await,
            Operation::UpdateAttributes(attrs) => api.update_attributes(id, attrs).await,
            Operation::LinkStorage(storage) => api.link_storage(id, storage).await,
            Operation::UnlinkStorage(storage_id) => api.unlink_storage(id, storage_id).await,
            Operation::LinkNetwork(network) => api.link_network(id, network).await,
            Operation::UnlinkNetwork(network_id) => api.unlink_network(id, network_id).await,
            Operation::LinkIp(ip) => api.link_ip(id, ip).await,
            Operation::UnlinkIp(ip_id) => api.unlink_ip(id, ip_id).await,
            Operation::LinkIso(iso_id) => api.link_iso(id, iso_id).await,
            Operation::UnlinkIso(iso_id) => api.unlink_iso(id, iso_id).await,
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(server_id = %id, op = %label, "server vanished during reconciliation");
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Operation {
                    op: label,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(())
}

/// Build the plan that takes `observed` to `desired`, without executing
/// anything.
///
/// The public network is resolved only when the IP presence transition
/// demands touching it, keeping the plan build itself free of remote
/// calls.
pub async fn plan_update(
    api: &dyn ServerApi,
    desired: &ServerSpec,
    observed: &ServerState,
) -> Result<Plan> {
    let public_network = match plan::public_net_action(observed, desired) {
        Some(_) => Some(api.resolve_public_network().await?),
        None => None,
    };

    plan::build_update_plan(observed, desired, public_network.as_ref())
}

/// Validate a creation spec and build its payload plus deferred plan,
/// without creating anything.
///
/// Both remote-backed validations (IP family per requested address, public
/// network existence) run here, before any mutation, so a rejected spec
/// leaves nothing behind.
pub async fn plan_create(
    api: &dyn ServerApi,
    desired: &ServerSpec,
) -> Result<(CreatePayload, Plan)> {
    plan::validate_spec(desired)?;

    for ip in desired.ipv4.iter().chain(desired.ipv6.iter()) {
        let family = api.resolve_ip_family(&ip.ip.object_id).await?;
        if family != ip.family {
            return Err(Error::Validation(format!(
                "ip {} is not a {} address",
                ip.ip.object_id, ip.family
            )));
        }
    }

    let public_network = if desired.has_public_ip() {
        Some(api.resolve_public_network().await?)
    } else {
        None
    };

    plan::build_create(desired, public_network.as_ref())
}

/// Converge the observed server onto the desired spec.
pub async fn reconcile(
    api: &dyn ServerApi,
    desired: &ServerSpec,
    observed: &ServerState,
) -> Result<()> {
    let plan = plan_update(api, desired, observed).await?;
    info!(server_id = %observed.id, ops = plan.len(), "executing reconciliation plan");
    execute_plan(api, &observed.id, plan).await
}

/// Validate and create a server, then attach what creation had to defer.
pub async fn create(api: &dyn ServerApi, desired: &ServerSpec) -> Result<ServerId> {
    let (payload, post) = plan_create(api, desired).await?;
    let id = api.create_server(&payload).await?;
    info!(server_id = %id, deferred_ops = post.len(), "server created");

    execute_plan(api, &id, post).await?;
    Ok(id)
}

/// Stop and delete. Shutdown failure aborts before the delete is
/// attempted; a server that is already gone counts as deleted.
pub async fn delete(api: &dyn ServerApi, id: &ServerId) -> Result<()> {
    match api.shutdown(id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            info!(server_id = %id, "server already gone");
            return Ok(());
        }
        Err(e) => {
            return Err(Error::Operation {
                op: "shutdown".into(),
                source: Box::new(e),
            });
        }
    }

    match api.delete_server(id).await {
        Ok(()) => {
            info!(server_id = %id, "server deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(Error::Operation {
            op: "delete server".into(),
            source: Box::new(e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::types::{
        AttrUpdate, CreatePayload, HardwareProfile, IpAttachment, IpFamily, NetworkAttachment,
        PeripheralRef, StorageAttachment,
    };

    fn api_error(status: u16) -> Error {
        Error::Api(gs_api::Error::Api {
            endpoint: "test",
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            body: String::new(),
        })
    }

    /// Records every call; optionally fails calls whose label starts with
    /// `fail_prefix`, either with a server error or a 404.
    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
        fail_prefix: Option<String>,
        fail_with_404: bool,
        ip_family: Option<IpFamily>,
        public_network: Option<PeripheralRef>,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) -> Result<()> {
            let call = call.into();
            let failing = self
                .fail_prefix
                .as_ref()
                .is_some_and(|p| call.starts_with(p.as_str()));
            self.calls.lock().unwrap().push(call);
            if failing {
                return Err(api_error(if self.fail_with_404 { 404 } else { 500 }));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ServerApi for RecordingApi {
        async fn fetch_state(&self, _id: &ServerId) -> Result<Option<ServerState>> {
            self.record("fetch state")?;
            Ok(None)
        }

        async fn create_server(&self, payload: &CreatePayload) -> Result<ServerId> {
            self.record(format!("create server {}", payload.name))?;
            Ok(ServerId("srv-new".into()))
        }

        async fn update_attributes(&self, _id: &ServerId, _attrs: &AttrUpdate) -> Result<()> {
            self.record("update attributes")
        }

        async fn shutdown(&self, _id: &ServerId) -> Result<()> {
            self.record("shutdown")
        }

        async fn start(&self, _id: &ServerId) -> Result<()> {
            self.record("start")
        }

        async fn delete_server(&self, _id: &ServerId) -> Result<()> {
            self.record("delete server")
        }

        async fn link_storage(&self, _id: &ServerId, storage: &StorageAttachment) -> Result<()> {
            self.record(format!("link storage {}", storage.storage.object_id))
        }

        async fn unlink_storage(&self, _id: &ServerId, storage_id: &str) -> Result<()> {
            self.record(format!("unlink storage {storage_id}"))
        }

        async fn link_network(&self, _id: &ServerId, network: &NetworkAttachment) -> Result<()> {
            self.record(format!("link network {}", network.network.object_id))
        }

        async fn unlink_network(&self, _id: &ServerId, network_id: &str) -> Result<()> {
            self.record(format!("unlink network {network_id}"))
        }

        async fn link_ip(&self, _id: &ServerId, ip: &IpAttachment) -> Result<()> {
            self.record(format!("link ip {}", ip.ip.object_id))
        }

        async fn unlink_ip(&self, _id: &ServerId, ip_id: &str) -> Result<()> {
            self.record(format!("unlink ip {ip_id}"))
        }

        async fn link_iso(&self, _id: &ServerId, iso_id: &str) -> Result<()> {
            self.record(format!("link isoimage {iso_id}"))
        }

        async fn unlink_iso(&self, _id: &ServerId, iso_id: &str) -> Result<()> {
            self.record(format!("unlink isoimage {iso_id}"))
        }

        async fn resolve_public_network(&self) -> Result<PeripheralRef> {
            self.record("resolve public network")?;
            self.public_network
                .clone()
                .ok_or(Error::NoPublicNetwork)
        }

        async fn resolve_ip_family(&self, ip_id: &str) -> Result<IpFamily> {
            self.record(format!("resolve ip family {ip_id}"))?;
            Ok(self.ip_family.unwrap_or(IpFamily::V4))
        }
    }

    fn spec() -> ServerSpec {
        ServerSpec {
            name: "web-1".into(),
            cores: 2,
            memory_gb: 4,
            hardware_profile: HardwareProfile::Default,
            location_id: None,
            availability_zone: None,
            labels: Default::default(),
            storages: vec![StorageAttachment::new("s-boot", true)],
            networks: Vec::new(),
            ipv4: None,
            ipv6: None,
            iso_image: None,
            power_on: true,
        }
    }

    fn state() -> ServerState {
        ServerState {
            id: ServerId("srv-1".into()),
            name: "web-1".into(),
            cores: 2,
            memory_gb: 4,
            hardware_profile: HardwareProfile::Default,
            availability_zone: None,
            labels: Default::default(),
            storages: vec![StorageAttachment::new("s-boot", true)],
            networks: Vec::new(),
            ipv4: None,
            ipv6: None,
            iso_image: None,
            power_on: true,
            current_price: 0.0,
            console_token: None,
            usage_minutes_cores: 0,
            usage_minutes_memory: 0,
            auto_recovery: true,
        }
    }

    #[tokio::test]
    async fn execution_halts_at_first_failure_with_operation_identity() {
        let api = RecordingApi {
            fail_prefix: Some("unlink storage".into()),
            ..Default::default()
        };
        let mut desired = spec();
        desired.storages = vec![
            StorageAttachment::new("s-boot", true),
            StorageAttachment::new("s-new", false),
        ];
        let mut observed = state();
        observed.storages = vec![
            StorageAttachment::new("s-boot", true),
            StorageAttachment::new("s-old", false),
        ];

        let err = reconcile(&api, &desired, &observed).await.unwrap_err();

        match err {
            Error::Operation { op, .. } => assert_eq!(op, "unlink storage s-old"),
            other => panic!("unexpected error: {other}"),
        }
        // Nothing after the failing unlink was attempted.
        assert!(!api.calls().iter().any(|c| c.starts_with("link storage")));
    }

    #[tokio::test]
    async fn vanished_server_ends_the_pass_successfully() {
        let api = RecordingApi {
            fail_prefix: Some("update attributes".into()),
            fail_with_404: true,
            ..Default::default()
        };
        let mut observed = state();
        observed.power_on = false;

        reconcile(&api, &spec(), &observed).await.unwrap();
        // The trailing power operation was never issued.
        assert!(!api.calls().contains(&"start".to_string()));
    }

    #[tokio::test]
    async fn converged_reconcile_issues_only_the_attribute_update() {
        let api = RecordingApi::default();

        reconcile(&api, &spec(), &state()).await.unwrap();

        assert_eq!(api.calls(), ["update attributes"]);
    }

    #[tokio::test]
    async fn reconcile_resolves_public_network_only_on_transition() {
        let api = RecordingApi {
            public_network: Some(PeripheralRef::network("net-public")),
            ..Default::default()
        };
        let mut desired = spec();
        desired.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));

        reconcile(&api, &desired, &state()).await.unwrap();

        let calls = api.calls();
        assert!(calls.contains(&"resolve public network".to_string()));
        assert!(calls.contains(&"link network net-public".to_string()));
    }

    #[tokio::test]
    async fn create_defers_secondary_storages_then_starts() {
        let api = RecordingApi::default();
        let mut desired = spec();
        desired.storages = vec![
            StorageAttachment::new("s-1", true),
            StorageAttachment::new("s-2", false),
            StorageAttachment::new("s-3", false),
        ];

        let id = create(&api, &desired).await.unwrap();

        assert_eq!(id, ServerId("srv-new".into()));
        assert_eq!(
            api.calls(),
            [
                "create server web-1",
                "link storage s-2",
                "link storage s-3",
                "start"
            ]
        );
    }

    #[tokio::test]
    async fn create_rejects_family_mismatch_before_any_mutation() {
        let api = RecordingApi {
            ip_family: Some(IpFamily::V6),
            ..Default::default()
        };
        let mut desired = spec();
        desired.ipv4 = Some(IpAttachment::new("ip-x", IpFamily::V4));

        let err = create(&api, &desired).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(api.calls(), ["resolve ip family ip-x"]);
    }

    #[tokio::test]
    async fn create_with_ip_fails_fast_without_public_network() {
        let api = RecordingApi {
            ip_family: Some(IpFamily::V6),
            ..Default::default()
        };
        let mut desired = spec();
        desired.ipv6 = Some(IpAttachment::new("ip-6", IpFamily::V6));

        let err = create(&api, &desired).await.unwrap_err();

        assert!(matches!(err, Error::NoPublicNetwork));
        assert!(!api.calls().iter().any(|c| c.starts_with("create server")));
    }

    #[tokio::test]
    async fn delete_aborts_when_shutdown_fails() {
        let api = RecordingApi {
            fail_prefix: Some("shutdown".into()),
            ..Default::default()
        };

        let err = delete(&api, &ServerId("srv-1".into())).await.unwrap_err();

        assert!(matches!(err, Error::Operation { ref op, .. } if op == "shutdown"));
        assert!(!api.calls().contains(&"delete server".to_string()));
    }

    #[tokio::test]
    async fn delete_of_missing_server_is_a_noop() {
        let api = RecordingApi {
            fail_prefix: Some("shutdown".into()),
            fail_with_404: true,
            ..Default::default()
        };

        delete(&api, &ServerId("srv-1".into())).await.unwrap();
        assert!(!api.calls().contains(&"delete server".to_string()));
    }
}
