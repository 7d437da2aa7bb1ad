use quarry_base::hashing::{HashMap, HashSet};
use quarry_base::{ResourceError, ResourceResult};

use crate::group::ResourceGroup;

/// Computes the ordered transitive closure of `root`'s dependencies: every
/// group appears after the groups it depends on, each group appears once, and
/// `root` comes last. The same closure serves unloading, where the batch is
/// consumed from the opposite end so dependents go first.
///
/// An unknown root or dependency name fails with `NotFound`; a dependency
/// cycle fails with `CycleDetected` rather than looping.
pub fn resolve_closure(
    groups: &HashMap<String, ResourceGroup>,
    root: &str,
) -> ResourceResult<Vec<String>> {
    let mut order = Vec::default();
    let mut visiting = HashSet::default();
    let mut visited = HashSet::default();
    visit(groups, root, &mut order, &mut visiting, &mut visited)?;
    Ok(order)
}

fn visit(
    groups: &HashMap<String, ResourceGroup>,
    name: &str,
    order: &mut Vec<String>,
    visiting: &mut HashSet<String>,
    visited: &mut HashSet<String>,
) -> ResourceResult<()> {
    if visited.contains(name) {
        return Ok(());
    }

    if !visiting.insert(name.to_string()) {
        log::error!("dependency cycle through group {}", name);
        return Err(ResourceError::CycleDetected);
    }

    let group = groups.get(name).ok_or_else(|| {
        log::warn!("dependency {} does not resolve to a known group", name);
        ResourceError::NotFound
    })?;

    for dependency in group.dependencies() {
        visit(groups, dependency, order, visiting, visited)?;
    }

    visiting.remove(name);
    visited.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{group_def, LoadLog, StubFactory};

    fn table(defs: &[(&str, &[&str])]) -> HashMap<String, ResourceGroup> {
        let log = LoadLog::default();
        let factory = StubFactory::new(&log);
        let mut groups = HashMap::default();
        for (name, deps) in defs {
            let def = group_def(name, "", deps, &["r"]);
            groups.insert(
                name.to_string(),
                ResourceGroup::from_definition(&def, &factory).unwrap(),
            );
        }
        groups
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let groups = table(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let closure = resolve_closure(&groups, "a").unwrap();
        assert_eq!(closure, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    }

    #[test]
    fn diamond_has_no_duplicates() {
        let groups = table(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let closure = resolve_closure(&groups, "top").unwrap();
        assert_eq!(closure.len(), 4);
        assert_eq!(closure[0], "base");
        assert_eq!(closure[3], "top");

        let base_pos = 0;
        let left_pos = closure.iter().position(|g| g == "left").unwrap();
        let right_pos = closure.iter().position(|g| g == "right").unwrap();
        assert!(left_pos > base_pos && right_pos > base_pos);
    }

    #[test]
    fn unknown_root_is_not_found() {
        let groups = table(&[]);
        assert_eq!(
            resolve_closure(&groups, "ghost").err(),
            Some(ResourceError::NotFound)
        );
    }

    #[test]
    fn unresolved_dependency_is_not_found() {
        let groups = table(&[("a", &["ghost"])]);
        assert_eq!(
            resolve_closure(&groups, "a").err(),
            Some(ResourceError::NotFound)
        );
    }

    #[test]
    fn cycle_is_detected() {
        let groups = table(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(
            resolve_closure(&groups, "a").err(),
            Some(ResourceError::CycleDetected)
        );

        // Self-cycle as well
        let groups = table(&[("narcissus", &["narcissus"])]);
        assert_eq!(
            resolve_closure(&groups, "narcissus").err(),
            Some(ResourceError::CycleDetected)
        );
    }
}
