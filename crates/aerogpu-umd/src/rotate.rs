//! Swap-chain style identity rotation.
//!
//! Rotating `[A, B, C]` moves protocol identities (handle + backing allocation) between resource
//! objects without recreating anything: A takes B's identity, B takes C's. What the last entry
//! receives is a [`RotationPolicy`] decision.

use crate::resource::ResourceIdentity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// The last entry takes the first entry's prior identity (a true cycle).
    #[default]
    Wrap,
    /// The last entry keeps its own identity.
    KeepLast,
}

/// New identities for `prior`, index for index.
pub fn rotated_identities(prior: &[ResourceIdentity], policy: RotationPolicy) -> Vec<ResourceIdentity> {
    let Some((&first, _)) = prior.split_first() else {
        return Vec::new();
    };
    let mut out: Vec<ResourceIdentity> = prior.iter().skip(1).copied().collect();
    let last = match policy {
        RotationPolicy::Wrap => first,
        RotationPolicy::KeepLast => prior[prior.len() - 1],
    };
    out.push(last);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(handle: u32) -> ResourceIdentity {
        ResourceIdentity {
            handle,
            backing_alloc_id: handle * 10,
        }
    }

    #[test]
    fn wrap_cycles_identities() {
        let out = rotated_identities(&[id(1), id(2), id(3)], RotationPolicy::Wrap);
        assert_eq!(out, vec![id(2), id(3), id(1)]);
    }

    #[test]
    fn keep_last_leaves_final_entry() {
        let out = rotated_identities(&[id(1), id(2), id(3)], RotationPolicy::KeepLast);
        assert_eq!(out, vec![id(2), id(3), id(3)]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(rotated_identities(&[], RotationPolicy::Wrap).is_empty());
    }
}
