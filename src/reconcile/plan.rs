//! The set-difference decision procedure.

use std::collections::HashSet;

/// What the reconciler has to do to move from the active adapter set to
/// the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Sets already match; touch nothing.
    Unchanged,
    /// Only additions, and something is already attached: attach these
    /// names incrementally, leaving the rest in place.
    Attach(Vec<String>),
    /// Apply the requested set from scratch. `reset` is true when the
    /// active set holds adapters not in the request, which the backends
    /// can only shed by a full detach (or reload) first.
    Rebuild { reset: bool },
}

/// Decide how to reconcile `active` into `requested`.
///
/// Order within `requested` is preserved in `Plan::Attach`; the first
/// requested adapter is the base attach in a rebuild.
pub fn plan(active: &[String], requested: &[String]) -> Plan {
    let active_set: HashSet<&str> = active.iter().map(String::as_str).collect();
    let requested_set: HashSet<&str> = requested.iter().map(String::as_str).collect();

    let added: Vec<String> = requested
        .iter()
        .filter(|name| !active_set.contains(name.as_str()))
        .cloned()
        .collect();
    let removed_any = active
        .iter()
        .any(|name| !requested_set.contains(name.as_str()));

    if added.is_empty() && !removed_any {
        Plan::Unchanged
    } else if !removed_any && !active.is_empty() {
        Plan::Attach(added)
    } else {
        Plan::Rebuild { reset: removed_any }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sets_are_unchanged() {
        assert_eq!(plan(&names(&["alpha"]), &names(&["alpha"])), Plan::Unchanged);
        assert_eq!(plan(&[], &[]), Plan::Unchanged);
    }

    #[test]
    fn order_does_not_force_work() {
        // Same membership, different order: nothing to attach or shed.
        assert_eq!(
            plan(&names(&["alpha", "beta"]), &names(&["beta", "alpha"])),
            Plan::Unchanged
        );
    }

    #[test]
    fn pure_addition_over_existing_is_incremental() {
        assert_eq!(
            plan(&names(&["alpha"]), &names(&["alpha", "beta"])),
            Plan::Attach(names(&["beta"]))
        );
    }

    #[test]
    fn addition_preserves_request_order() {
        assert_eq!(
            plan(&names(&["beta"]), &names(&["gamma", "beta", "alpha"])),
            Plan::Attach(names(&["gamma", "alpha"]))
        );
    }

    #[test]
    fn cold_start_rebuilds_without_reset() {
        assert_eq!(
            plan(&[], &names(&["alpha"])),
            Plan::Rebuild { reset: false }
        );
    }

    #[test]
    fn any_removal_forces_reset() {
        assert_eq!(
            plan(&names(&["alpha", "beta"]), &names(&["beta"])),
            Plan::Rebuild { reset: true }
        );
        assert_eq!(
            plan(&names(&["alpha"]), &names(&["beta"])),
            Plan::Rebuild { reset: true }
        );
        assert_eq!(plan(&names(&["alpha"]), &[]), Plan::Rebuild { reset: true });
    }
}
