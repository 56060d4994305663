//! Pure diff primitives: which attachments move between two snapshots, and
//! whether the move can only be applied across a power-cycle.

use crate::types::{Attached, HardwareProfile, IpAttachment, ServerSpec, ServerState};

/// Split `old` vs `new` into removals and additions by object identity.
///
/// Attachments present on both sides are untouched: an attribute change on
/// a surviving attachment (e.g. flipping its boot-device flag) is not
/// expressed as a re-link here, that is an explicit unlink/link decision
/// left to the caller. Addition order follows `new`, removal order follows
/// `old`, so the result is deterministic for a given pair of inputs.
pub fn diff_attachments<'a, T: Attached>(old: &'a [T], new: &'a [T]) -> (Vec<&'a T>, Vec<&'a T>) {
    let to_remove = old
        .iter()
        .filter(|o| !new.iter().any(|n| n.object_id() == o.object_id()))
        .collect();
    let to_add = new
        .iter()
        .filter(|n| !old.iter().any(|o| o.object_id() == n.object_id()))
        .collect();
    (to_remove, to_add)
}

/// True when the two collections attach a different set of object ids.
pub(crate) fn sets_differ<T: Attached>(old: &[T], new: &[T]) -> bool {
    let (to_remove, to_add) = diff_attachments(old, new);
    !to_remove.is_empty() || !to_add.is_empty()
}

/// True when one family's attachment changed identity (added, removed, or
/// replaced by a different address).
pub(crate) fn ip_changed(old: &Option<IpAttachment>, new: &Option<IpAttachment>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(o), Some(n)) => o.ip.object_id != n.ip.object_id,
        _ => true,
    }
}

/// Decide whether the diff between `old` and `new` can only be applied
/// across a power-cycle.
///
/// Shrinking cores or memory is not hot-pluggable; the legacy hardware
/// profile forbids hot resizing in either direction; and peripheral
/// attach/detach always goes through a cycle on this platform. Growing
/// cores or memory on a non-legacy profile is hot-appliable.
pub fn requires_power_cycle(old: &ServerState, new: &ServerSpec) -> bool {
    let legacy = old.hardware_profile == HardwareProfile::Legacy;

    if new.cores != old.cores && (new.cores < old.cores || legacy) {
        return true;
    }
    if new.memory_gb != old.memory_gb && (new.memory_gb < old.memory_gb || legacy) {
        return true;
    }
    if ip_changed(&old.ipv4, &new.ipv4) || ip_changed(&old.ipv6, &new.ipv6) {
        return true;
    }

    sets_differ(&old.storages, &new.storages) || sets_differ(&old.networks, &new.networks)
}
