//! Version and locality aware candidate filtering.
//!
//! # Priority chain
//! ```text
//! version requested?
//!   yes → instances tagged with exactly that version
//!         → else co-located instances (any version)
//!         → else unversioned instances
//!   no  → co-located instances
//!         → else unversioned instances
//! ```
//!
//! The result keeps the relative order of the input. Ties inside the
//! returned set are left to the `Chooser`.

use std::sync::Arc;

use crate::registry::ServiceInstance;

/// Compute the candidate set for a request.
///
/// `version` is the requested version token; blank tokens count as absent.
/// `local_host` is the caller's own host, used for co-location preference.
/// An empty result means no instance may serve the request.
pub fn select_candidates(
    instances: &[Arc<ServiceInstance>],
    version: Option<&str>,
    local_host: &str,
) -> Vec<Arc<ServiceInstance>> {
    let version = version.filter(|v| !v.trim().is_empty());

    let (versioned, unversioned): (Vec<_>, Vec<_>) = instances
        .iter()
        .cloned()
        .partition(|instance| instance.version().is_some());

    let co_located: Vec<Arc<ServiceInstance>> = instances
        .iter()
        .filter(|instance| instance.host == local_host)
        .cloned()
        .collect();

    match version {
        Some(requested) => {
            let exact: Vec<Arc<ServiceInstance>> = versioned
                .into_iter()
                .filter(|instance| instance.version() == Some(requested))
                .collect();
            if !exact.is_empty() {
                exact
            } else if !co_located.is_empty() {
                co_located
            } else {
                unversioned
            }
        }
        None if co_located.is_empty() => unversioned,
        None => co_located,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(host: &str, port: u16, version: Option<&str>) -> Arc<ServiceInstance> {
        let instance = ServiceInstance::new("orders", host, port);
        Arc::new(match version {
            Some(v) => instance.with_version(v),
            None => instance,
        })
    }

    fn ports(set: &[Arc<ServiceInstance>]) -> Vec<u16> {
        set.iter().map(|i| i.port).collect()
    }

    const LOCAL: &str = "192.168.0.10";

    #[test]
    fn test_exact_version_match() {
        let instances = vec![
            inst("10.0.0.1", 8080, None),
            inst("10.0.0.2", 8080, Some("v2")),
        ];
        let set = select_candidates(&instances, Some("v2"), LOCAL);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].host, "10.0.0.2");
        assert_eq!(set[0].version(), Some("v2"));
    }

    #[test]
    fn test_exact_match_beats_co_located() {
        let instances = vec![
            inst(LOCAL, 1, None),
            inst("10.0.0.2", 2, Some("v1")),
            inst("10.0.0.3", 3, Some("v2")),
            inst(LOCAL, 4, Some("v1")),
            inst("10.0.0.5", 5, Some("v2")),
        ];
        let set = select_candidates(&instances, Some("v2"), LOCAL);
        assert_eq!(ports(&set), vec![3, 5]);
    }

    #[test]
    fn test_no_match_falls_back_to_co_located() {
        let instances = vec![inst("10.0.0.1", 8080, None)];
        let set = select_candidates(&instances, Some("v9"), "10.0.0.1");
        assert_eq!(ports(&set), vec![8080]);

        let mixed = vec![
            inst("10.0.0.2", 1, None),
            inst(LOCAL, 2, Some("v1")),
            inst(LOCAL, 3, None),
        ];
        let set = select_candidates(&mixed, Some("v9"), LOCAL);
        assert_eq!(ports(&set), vec![2, 3]);
    }

    #[test]
    fn test_no_match_no_local_falls_back_to_unversioned() {
        let instances = vec![
            inst("10.0.0.1", 1, None),
            inst("10.0.0.2", 2, Some("v1")),
            inst("10.0.0.3", 3, None),
        ];
        let set = select_candidates(&instances, Some("v9"), LOCAL);
        assert_eq!(ports(&set), vec![1, 3]);

        let only_versioned = vec![inst("10.0.0.2", 2, Some("v1"))];
        assert!(select_candidates(&only_versioned, Some("v9"), LOCAL).is_empty());
    }

    #[test]
    fn test_no_version_prefers_co_located() {
        let instances = vec![
            inst("10.0.0.1", 1, None),
            inst(LOCAL, 2, Some("v1")),
        ];
        let set = select_candidates(&instances, None, LOCAL);
        assert_eq!(ports(&set), vec![2]);

        let set = select_candidates(&instances, None, "10.9.9.9");
        assert_eq!(ports(&set), vec![1]);
    }

    #[test]
    fn test_blank_version_is_absent() {
        let instances = vec![
            inst("10.0.0.1", 1, None),
            inst("10.0.0.2", 2, Some("")),
        ];
        assert_eq!(ports(&select_candidates(&instances, Some("  "), LOCAL)), vec![1]);
    }

    #[test]
    fn test_unversioned_lists_pass_through_for_any_token() {
        let instances: Vec<_> = (1..=5).map(|p| inst(&format!("10.0.0.{}", p), p, None)).collect();
        for token in [None, Some("v1"), Some("anything"), Some("")] {
            let set = select_candidates(&instances, token, LOCAL);
            assert_eq!(ports(&set), vec![1, 2, 3, 4, 5], "token={:?}", token);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(select_candidates(&[], Some("v1"), LOCAL).is_empty());
        assert!(select_candidates(&[], None, LOCAL).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let instances = vec![
            inst("10.0.0.1", 1, None),
            inst(LOCAL, 2, Some("v1")),
            inst("10.0.0.3", 3, Some("v2")),
            inst("10.0.0.4", 4, None),
        ];
        for token in [None, Some("v1"), Some("v2"), Some("v3")] {
            let first = ports(&select_candidates(&instances, token, LOCAL));
            for _ in 0..10 {
                assert_eq!(ports(&select_candidates(&instances, token, LOCAL)), first);
            }
        }
    }
}
