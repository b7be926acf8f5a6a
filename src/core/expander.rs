//! CF-007: Path expansion — walk the registry backward from each target.
//!
//! Every target starts as a one-element path. A path whose head has a rule
//! with inputs is replaced by one path per input, prepended; the new paths
//! go to the back of the list. Expansion stops when no head has a rule.
//! Paths that share suffixes (diamonds) are kept apart on purpose; the
//! driver handles them.

use super::error::FlowError;
use super::registry::Registry;
use super::types::{TraceEvent, VarPath};
use crate::tripwire::tracelog::TraceLog;

/// Expand `targets` into root-to-target dependency paths.
///
/// Fails with [`FlowError::DependencyCycle`] when an input chain revisits a
/// variable already on the path, before anything is executed.
pub fn expand<S: AsRef<str>>(
    registry: &Registry,
    targets: &[S],
    trace: &mut TraceLog,
) -> Result<Vec<VarPath>, FlowError> {
    let mut paths: Vec<VarPath> = targets
        .iter()
        .map(|t| VarPath::single(t.as_ref()))
        .collect();
    let mut i = 0;
    while i < paths.len() {
        let cell = match paths[i].head().map(|head| registry.rule(head)) {
            Some(Ok(cell)) if !cell.inputs.is_empty() => cell,
            // Leaf: unregistered, or a cell with nothing to depend on
            _ => {
                i += 1;
                continue;
            }
        };

        let path = paths.remove(i);
        for dep in cell.input_names() {
            // Every variable on a path has a rule, so revisits are the only way to loop
            if path.contains(dep) {
                let looped = path.extended(dep);
                return Err(FlowError::DependencyCycle {
                    variable: dep.to_string(),
                    path: looped.to_string(),
                });
            }
            paths.push(path.extended(dep));
        }
    }

    for path in &paths {
        trace.push(TraceEvent::PathDiscovered {
            path: path.to_string(),
        });
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Body;

    fn rendered(paths: &[VarPath]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_cf007_unregistered_target_is_its_own_path() {
        let reg = Registry::new();
        let mut trace = TraceLog::new();
        let paths = expand(&reg, &["x"], &mut trace).unwrap();
        assert_eq!(rendered(&paths), vec!["x"]);
        assert_eq!(trace.paths(), vec!["x"]);
    }

    #[test]
    fn test_cf007_linear_chain() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("B1"));
        reg.register(["b"], ["c"], Body::from("B2"));
        let mut trace = TraceLog::new();
        let paths = expand(&reg, &["c"], &mut trace).unwrap();
        assert_eq!(rendered(&paths), vec!["a -> b -> c"]);
        assert_eq!(trace.paths(), vec!["a -> b -> c"]);
    }

    #[test]
    fn test_cf007_diamond_keeps_every_path() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b", "c"], Body::from("f1"));
        reg.register(["b", "d"], ["e"], Body::from("f2"));
        reg.register(["c", "d"], ["g"], Body::from("f3"));
        let mut trace = TraceLog::new();
        let paths = expand(&reg, &["e", "g"], &mut trace).unwrap();
        assert_eq!(
            rendered(&paths),
            vec!["d -> e", "d -> g", "a -> b -> e", "a -> c -> g"]
        );
        for p in &paths {
            // Adjacent pairs follow registered inputs
            let vars: Vec<_> = p.vars().collect();
            for pair in vars.windows(2) {
                assert!(reg.rule(pair[1]).unwrap().inputs.contains_key(pair[0]));
            }
        }
    }

    #[test]
    fn test_cf007_input_less_cell_is_leaf() {
        let mut reg = Registry::new();
        reg.register(Vec::<String>::new(), ["seed"], Body::from("s"));
        reg.register(["seed"], ["out"], Body::from("o"));
        let mut trace = TraceLog::new();
        let paths = expand(&reg, &["out"], &mut trace).unwrap();
        assert_eq!(rendered(&paths), vec!["seed -> out"]);
    }

    #[test]
    fn test_cf007_mutual_cycle_detected() {
        let mut reg = Registry::new();
        reg.register(["y"], ["x"], Body::from("fx"));
        reg.register(["x"], ["y"], Body::from("fy"));
        let mut trace = TraceLog::new();
        let err = expand(&reg, &["x"], &mut trace).unwrap_err();
        match err {
            FlowError::DependencyCycle { variable, path } => {
                assert_eq!(variable, "x");
                assert_eq!(path, "x -> y -> x");
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(trace.is_empty());
    }

    #[test]
    fn test_cf007_self_cycle_detected() {
        let mut reg = Registry::new();
        reg.register(["x", "a"], ["x"], Body::from("fx"));
        let mut trace = TraceLog::new();
        assert!(matches!(
            expand(&reg, &["x"], &mut trace),
            Err(FlowError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_cf007_multiple_targets_sharing_leaf() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("f"));
        reg.register(["a"], ["c"], Body::from("g"));
        let mut trace = TraceLog::new();
        let paths = expand(&reg, &["b", "c"], &mut trace).unwrap();
        assert_eq!(rendered(&paths), vec!["a -> b", "a -> c"]);
    }
}
