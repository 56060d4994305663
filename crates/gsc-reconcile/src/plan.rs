//! Plan construction: the ordered operation sequence that converges an
//! observed server onto a desired spec, and the one-shot creation variant.

use std::fmt;

use crate::diff::{diff_attachments, ip_changed, requires_power_cycle};
use crate::types::{
    AttrUpdate, CreatePayload, IpAttachment, NetworkAttachment, PeripheralRef, ServerSpec,
    ServerState, StorageAttachment,
};
use crate::{Error, Result};

/// The remote caps a server at 8 storages and 7 declared networks.
const MAX_STORAGES: usize = 8;
const MAX_NETWORKS: usize = 7;

/// One remote mutation. The rendered form is "kind + target", which is
/// what execution errors get wrapped in.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Shutdown,
    Start,
    UpdateAttributes(AttrUpdate),
    LinkStorage(StorageAttachment),
    UnlinkStorage(String),
    LinkNetwork(NetworkAttachment),
    UnlinkNetwork(String),
    LinkIp(IpAttachment),
    UnlinkIp(String),
    LinkIso(String),
    UnlinkIso(String),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Shutdown => f.write_str("shutdown"),
            Operation::Start => f.write_str("start"),
            Operation::UpdateAttributes(_) => f.write_str("update attributes"),
            Operation::LinkStorage(s) => write!(f, "link storage {}", s.storage.object_id),
            Operation::UnlinkStorage(id) => write!(f, "unlink storage {id}"),
            Operation::LinkNetwork(n) => write!(f, "link network {}", n.network.object_id),
            Operation::UnlinkNetwork(id) => write!(f, "unlink network {id}"),
            Operation::LinkIp(ip) => write!(f, "link ip {}", ip.ip.object_id),
            Operation::UnlinkIp(id) => write!(f, "unlink ip {id}"),
            Operation::LinkIso(id) => write!(f, "link isoimage {id}"),
            Operation::UnlinkIso(id) => write!(f, "unlink isoimage {id}"),
        }
    }
}

/// Ordered operations for one pass. Built, executed, discarded; the
/// executor exclusively owns the in-flight plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    ops: Vec<Operation>,
}

impl Plan {
    fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Reject a spec that breaks an invariant, before any plan exists and
/// before anything reaches the remote.
pub fn validate_spec(spec: &ServerSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(Error::Validation("name must not be empty".into()));
    }
    if spec.name.chars().count() > 64 {
        return Err(Error::Validation(
            "name must be at most 64 characters".into(),
        ));
    }
    if spec.cores == 0 {
        return Err(Error::Validation("cores must be at least 1".into()));
    }
    if spec.memory_gb == 0 {
        return Err(Error::Validation("memory must be at least 1 GB".into()));
    }
    if spec.storages.len() > MAX_STORAGES {
        return Err(Error::Validation(format!(
            "at most {MAX_STORAGES} storages can be attached"
        )));
    }
    if spec.networks.len() > MAX_NETWORKS {
        return Err(Error::Validation(format!(
            "at most {MAX_NETWORKS} networks can be attached"
        )));
    }

    let boot_devices = spec.storages.iter().filter(|s| s.is_boot_device).count();
    if boot_devices > 1 {
        return Err(Error::Validation(format!(
            "{boot_devices} storages are marked as boot device, at most one is allowed"
        )));
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublicNetAction {
    Link,
    Unlink,
}

/// Whether this pass must touch the public network, evaluated once per
/// reconciliation: only a transition of the IP-family union across the
/// none/some boundary does. An IP that survives the diff keeps the server
/// on the public network even while the other family is being replaced.
pub(crate) fn public_net_action(old: &ServerState, new: &ServerSpec) -> Option<PublicNetAction> {
    let changed = ip_changed(&old.ipv4, &new.ipv4) || ip_changed(&old.ipv6, &new.ipv6);
    if !changed {
        return None;
    }

    let had = old.ipv4.is_some() || old.ipv6.is_some();
    let has = new.ipv4.is_some() || new.ipv6.is_some();
    match (had, has) {
        (false, true) => Some(PublicNetAction::Link),
        (true, false) => Some(PublicNetAction::Unlink),
        _ => None,
    }
}

/// Assemble the ordered operation sequence that converges `old` onto
/// `new`.
///
/// The order is fixed: shutdown when the diff demands a cycle, the
/// always-emitted attribute update, ISO swap, per-family IP swap, the
/// public-network transition, network removals then additions, storage
/// removals then additions (additions in spec order), and finally the
/// desired power state whenever a cycle happened or the observed power
/// state disagrees. Both trailing power operations are no-ops on the
/// remote when the server is already there.
///
/// `public_network` must be the resolved public network whenever
/// [`public_net_action`] is `Some`; passing `None` in that case is an
/// error, not a deferral. The builder itself never talks to the remote.
pub fn build_update_plan(
    old: &ServerState,
    new: &ServerSpec,
    public_network: Option<&PeripheralRef>,
) -> Result<Plan> {
    validate_spec(new)?;
    if new.hardware_profile != old.hardware_profile {
        return Err(Error::Validation(format!(
            "hardware profile cannot change on an existing server (observed {}, desired {})",
            old.hardware_profile, new.hardware_profile
        )));
    }

    let mut plan = Plan::default();

    let cycle = requires_power_cycle(old, new);
    if cycle {
        plan.push(Operation::Shutdown);
    }

    plan.push(Operation::UpdateAttributes(AttrUpdate::from_spec(new)));

    // A server holds at most one ISO image; a swap is unlink then link.
    if old.iso_image != new.iso_image {
        if let Some(old_iso) = &old.iso_image {
            plan.push(Operation::UnlinkIso(old_iso.object_id.clone()));
        }
        if let Some(new_iso) = &new.iso_image {
            plan.push(Operation::LinkIso(new_iso.object_id.clone()));
        }
    }

    // Public IPs, each family independently.
    for (old_ip, new_ip) in [(&old.ipv4, &new.ipv4), (&old.ipv6, &new.ipv6)] {
        if ip_changed(old_ip, new_ip) {
            if let Some(o) = old_ip {
                plan.push(Operation::UnlinkIp(o.ip.object_id.clone()));
            }
            if let Some(n) = new_ip {
                plan.push(Operation::LinkIp(n.clone()));
            }
        }
    }

    if let Some(action) = public_net_action(old, new) {
        let public = public_network.ok_or(Error::NoPublicNetwork)?;
        match action {
            PublicNetAction::Link => {
                plan.push(Operation::LinkNetwork(NetworkAttachment::new(
                    public.object_id.clone(),
                )));
            }
            PublicNetAction::Unlink => {
                plan.push(Operation::UnlinkNetwork(public.object_id.clone()));
            }
        }
    }

    // Declared networks. The observed collection never contains the
    // public network, so the differ cannot fight the step above.
    let (removed, added) = diff_attachments(&old.networks, &new.networks);
    for network in removed {
        plan.push(Operation::UnlinkNetwork(network.network.object_id.clone()));
    }
    for network in added {
        plan.push(Operation::LinkNetwork(network.clone()));
    }

    let (removed, added) = diff_attachments(&old.storages, &new.storages);
    for storage in removed {
        plan.push(Operation::UnlinkStorage(storage.storage.object_id.clone()));
    }
    for storage in added {
        plan.push(Operation::LinkStorage(storage.clone()));
    }

    // Restore (or reach) the desired power state. When nothing cycled and
    // the observed state already matches, a fully-converged pass stays a
    // pure attribute no-op.
    if cycle || old.power_on != new.power_on {
        plan.push(if new.power_on {
            Operation::Start
        } else {
            Operation::Shutdown
        });
    }

    Ok(plan)
}

/// Split creation into the single create call and the deferred plan.
///
/// Only the boot storage rides the create call: attaching more than one
/// storage at creation leaves the choice of boot device to the remote
/// side, which is exactly the ambiguity this sequencer exists to prevent.
/// Every other storage becomes a deferred link in declared order, followed
/// by `Start` when `power_on` is set.
///
/// `public_network` is required as soon as either IP family is requested;
/// a missing public network is a fatal precondition, not something to
/// defer past the create call.
pub fn build_create(
    new: &ServerSpec,
    public_network: Option<&PeripheralRef>,
) -> Result<(CreatePayload, Plan)> {
    validate_spec(new)?;

    let public_network = if new.has_public_ip() {
        Some(public_network.ok_or(Error::NoPublicNetwork)?.clone())
    } else {
        None
    };

    let payload = CreatePayload {
        name: new.name.clone(),
        cores: new.cores,
        memory_gb: new.memory_gb,
        hardware_profile: new.hardware_profile,
        location_id: new.location_id.clone(),
        availability_zone: new.availability_zone.clone(),
        labels: new.labels.clone(),
        boot_storage: new.boot_storage().cloned(),
        networks: new.networks.clone(),
        public_network,
        public_ips: new.ipv4.iter().chain(new.ipv6.iter()).cloned().collect(),
        iso_image: new.iso_image.clone(),
    };

    let mut post = Plan::default();
    for storage in new.storages.iter().filter(|s| !s.is_boot_device) {
        post.push(Operation::LinkStorage(storage.clone()));
    }
    if new.power_on {
        post.push(Operation::Start);
    }

    Ok((payload, post))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HardwareProfile, IpFamily, ServerId};

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

    /// A spec denoting exactly the same configuration as [`state`].
    fn converged_spec() -> ServerSpec {
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

    fn public_net() -> PeripheralRef {
        PeripheralRef::network("net-public")
    }

    fn kinds(plan: &Plan) -> Vec<String> {
        plan.operations().iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn converged_spec_yields_only_the_attribute_noop() {
        let plan = build_update_plan(&state(), &converged_spec(), None).unwrap();
        assert_eq!(kinds(&plan), ["update attributes"]);
    }

    #[test]
    fn power_state_drift_alone_is_corrected_without_a_cycle() {
        let mut old = state();
        old.power_on = false;

        let plan = build_update_plan(&old, &converged_spec(), None).unwrap();
        assert_eq!(kinds(&plan), ["update attributes", "start"]);
    }

    #[test]
    fn structural_change_shuts_down_first_and_starts_last() {
        let mut new = converged_spec();
        new.storages.push(StorageAttachment::new("s-extra", false));

        let plan = build_update_plan(&state(), &new, None).unwrap();
        let ops = plan.operations();
        assert_eq!(ops.first(), Some(&Operation::Shutdown));
        assert_eq!(ops.last(), Some(&Operation::Start));
        assert!(
            ops.contains(&Operation::LinkStorage(StorageAttachment::new(
                "s-extra", false
            )))
        );
    }

    #[test]
    fn powered_off_spec_ends_with_shutdown() {
        let mut new = converged_spec();
        new.power_on = false;

        let plan = build_update_plan(&state(), &new, None).unwrap();
        assert_eq!(plan.operations().last(), Some(&Operation::Shutdown));
    }

    #[test]
    fn attribute_update_precedes_every_peripheral_operation() {
        let mut old = state();
        old.iso_image = Some(PeripheralRef::iso_image("iso-old"));
        let mut new = converged_spec();
        new.iso_image = Some(PeripheralRef::iso_image("iso-new"));
        new.storages.push(StorageAttachment::new("s-extra", false));

        let plan = build_update_plan(&old, &new, None).unwrap();
        let attr_pos = plan
            .operations()
            .iter()
            .position(|op| matches!(op, Operation::UpdateAttributes(_)))
            .unwrap();
        let first_peripheral = plan
            .operations()
            .iter()
            .position(|op| {
                matches!(
                    op,
                    Operation::LinkStorage(_)
                        | Operation::UnlinkStorage(_)
                        | Operation::LinkNetwork(_)
                        | Operation::UnlinkNetwork(_)
                        | Operation::LinkIp(_)
                        | Operation::UnlinkIp(_)
                        | Operation::LinkIso(_)
                        | Operation::UnlinkIso(_)
                )
            })
            .unwrap();
        assert!(attr_pos < first_peripheral);
    }

    #[test]
    fn iso_swap_unlinks_old_before_linking_new() {
        let mut old = state();
        old.iso_image = Some(PeripheralRef::iso_image("iso-old"));
        let mut new = converged_spec();
        new.iso_image = Some(PeripheralRef::iso_image("iso-new"));

        let plan = build_update_plan(&old, &new, None).unwrap();
        let ops = kinds(&plan);
        let unlink = ops.iter().position(|o| o == "unlink isoimage iso-old");
        let link = ops.iter().position(|o| o == "link isoimage iso-new");
        assert!(unlink.unwrap() < link.unwrap());
    }

    #[test]
    fn ip_replacement_emits_unlink_then_link_for_that_family() {
        let mut old = state();
        old.ipv4 = Some(IpAttachment::new("ip-old", IpFamily::V4));
        let mut new = converged_spec();
        new.ipv4 = Some(IpAttachment::new("ip-new", IpFamily::V4));

        let plan = build_update_plan(&old, &new, None).unwrap();
        let ops = kinds(&plan);
        let unlink = ops.iter().position(|o| o == "unlink ip ip-old").unwrap();
        let link = ops.iter().position(|o| o == "link ip ip-new").unwrap();
        assert!(unlink < link);
    }

    #[test]
    fn replacing_one_family_never_touches_public_network() {
        // ipv6 unset on both sides, ipv4 replaced: no none/some transition.
        let mut old = state();
        old.ipv4 = Some(IpAttachment::new("ip-old", IpFamily::V4));
        let mut new = converged_spec();
        new.ipv4 = Some(IpAttachment::new("ip-new", IpFamily::V4));

        let plan = build_update_plan(&old, &new, Some(&public_net())).unwrap();
        assert!(!plan.operations().iter().any(|op| matches!(
            op,
            Operation::LinkNetwork(_) | Operation::UnlinkNetwork(_)
        )));
    }

    #[test]
    fn first_ip_links_public_network_once_even_for_both_families() {
        let old = state();
        let mut new = converged_spec();
        new.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));
        new.ipv6 = Some(IpAttachment::new("ip-6", IpFamily::V6));

        let plan = build_update_plan(&old, &new, Some(&public_net())).unwrap();
        let links = plan
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::LinkNetwork(n) if n.network.object_id == "net-public"))
            .count();
        assert_eq!(links, 1);
    }

    #[test]
    fn dropping_last_ip_unlinks_public_network() {
        let mut old = state();
        old.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));
        let new = converged_spec();

        let plan = build_update_plan(&old, &new, Some(&public_net())).unwrap();
        assert!(
            plan.operations()
                .contains(&Operation::UnlinkNetwork("net-public".into()))
        );
    }

    #[test]
    fn surviving_ip_suppresses_public_network_link_while_other_family_changes() {
        let mut old = state();
        old.ipv6 = Some(IpAttachment::new("ip-6", IpFamily::V6));
        let mut new = converged_spec();
        new.ipv6 = Some(IpAttachment::new("ip-6", IpFamily::V6));
        new.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));

        let plan = build_update_plan(&old, &new, Some(&public_net())).unwrap();
        assert!(!plan.operations().iter().any(|op| matches!(
            op,
            Operation::LinkNetwork(_) | Operation::UnlinkNetwork(_)
        )));
    }

    #[test]
    fn needed_public_network_missing_is_an_error() {
        let old = state();
        let mut new = converged_spec();
        new.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));

        let err = build_update_plan(&old, &new, None).unwrap_err();
        assert!(matches!(err, Error::NoPublicNetwork));
    }

    #[test]
    fn storage_plan_converges_old_set_onto_new_set() {
        let mut old = state();
        old.storages = vec![
            StorageAttachment::new("s-boot", true),
            StorageAttachment::new("s-a", false),
            StorageAttachment::new("s-b", false),
        ];
        let mut new = converged_spec();
        new.storages = vec![
            StorageAttachment::new("s-boot", true),
            StorageAttachment::new("s-b", false),
            StorageAttachment::new("s-c", false),
        ];

        let plan = build_update_plan(&old, &new, None).unwrap();

        // Replay the plan's storage operations over the old set.
        let mut set: Vec<String> = old.storages.iter().map(|s| s.storage.object_id.clone()).collect();
        for op in plan.operations() {
            match op {
                Operation::UnlinkStorage(id) => set.retain(|s| s != id),
                Operation::LinkStorage(s) => set.push(s.storage.object_id.clone()),
                _ => {}
            }
        }
        let mut want: Vec<String> = new.storages.iter().map(|s| s.storage.object_id.clone()).collect();
        set.sort();
        want.sort();
        assert_eq!(set, want);
    }

    #[test]
    fn storage_additions_follow_spec_order() {
        let old = state();
        let mut new = converged_spec();
        new.storages.push(StorageAttachment::new("s-2", false));
        new.storages.push(StorageAttachment::new("s-1", false));

        let plan = build_update_plan(&old, &new, None).unwrap();
        let added: Vec<_> = plan
            .operations()
            .iter()
            .filter_map(|op| match op {
                Operation::LinkStorage(s) => Some(s.storage.object_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, ["s-2", "s-1"]);
    }

    #[test]
    fn network_removals_precede_additions() {
        let mut old = state();
        old.networks = vec![NetworkAttachment::new("n-old")];
        let mut new = converged_spec();
        new.networks = vec![NetworkAttachment::new("n-new")];

        let plan = build_update_plan(&old, &new, None).unwrap();
        let ops = kinds(&plan);
        let unlink = ops.iter().position(|o| o == "unlink network n-old").unwrap();
        let link = ops.iter().position(|o| o == "link network n-new").unwrap();
        assert!(unlink < link);
    }

    #[test]
    fn two_boot_devices_fail_validation_before_planning() {
        let mut new = converged_spec();
        new.storages = vec![
            StorageAttachment::new("s-1", true),
            StorageAttachment::new("s-2", true),
        ];

        let err = build_update_plan(&state(), &new, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = build_create(&new, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_name_fails_validation() {
        let mut new = converged_spec();
        new.name = "  ".into();
        assert!(matches!(
            build_create(&new, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn hardware_profile_change_is_rejected() {
        let mut new = converged_spec();
        new.hardware_profile = HardwareProfile::Q35;
        assert!(matches!(
            build_update_plan(&state(), &new, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn creation_defers_every_non_boot_storage_in_order() {
        let mut new = converged_spec();
        new.storages = vec![
            StorageAttachment::new("s-1", true),
            StorageAttachment::new("s-2", false),
            StorageAttachment::new("s-3", false),
        ];
        new.power_on = true;

        let (payload, post) = build_create(&new, None).unwrap();

        assert_eq!(
            payload.boot_storage,
            Some(StorageAttachment::new("s-1", true))
        );
        assert_eq!(
            kinds(&post),
            ["link storage s-2", "link storage s-3", "start"]
        );
    }

    #[test]
    fn creation_without_power_has_no_trailing_start() {
        let mut new = converged_spec();
        new.power_on = false;

        let (_, post) = build_create(&new, None).unwrap();
        assert!(post.is_empty());
    }

    #[test]
    fn creation_with_ip_requires_and_records_public_network() {
        let mut new = converged_spec();
        new.ipv4 = Some(IpAttachment::new("ip-4", IpFamily::V4));

        assert!(matches!(
            build_create(&new, None),
            Err(Error::NoPublicNetwork)
        ));

        let (payload, _) = build_create(&new, Some(&public_net())).unwrap();
        assert_eq!(payload.public_network, Some(public_net()));
        assert_eq!(payload.public_ips.len(), 1);
    }

    #[test]
    fn creation_without_ip_carries_no_public_network() {
        let new = converged_spec();
        let (payload, _) = build_create(&new, Some(&public_net())).unwrap();
        assert_eq!(payload.public_network, None);
        assert!(payload.public_ips.is_empty());
    }
}
