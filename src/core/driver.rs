//! CF-011: Resolution driver — run exactly the stale cells, once each.
//!
//! Repeated passes over the path list until it is empty. Per path:
//! 1. Skip ahead while the next variable needs no work: its cell already ran
//!    in this call, or the head input is unchanged since the cell last ran.
//! 2. If another path still has two or more variables before the same next
//!    variable, defer: that path has upstream work pending for it.
//!    A colliding path holding it at index 1 does not block.
//! 3. Otherwise run the cell, record every input's fingerprint, and advance.
//!
//! A pass that makes no progress means the remaining paths wait on each
//! other, which is reported as a cycle.

use super::error::FlowError;
use super::namespace::Namespace;
use super::registry::Registry;
use super::types::{ComputeReport, SkipReason, TraceEvent, VarPath};
use crate::transport::Executor;
use crate::tripwire::hasher;
use crate::tripwire::tracelog::TraceLog;
use rustc_hash::FxHashSet;

/// Resolve `paths`, leaving it empty on success.
///
/// On error the remaining paths are left in place, and fingerprints recorded
/// for cells that already ran are kept.
pub fn resolve<N, E>(
    registry: &mut Registry,
    paths: &mut Vec<VarPath>,
    ns: &mut N,
    exec: &mut E,
    trace: &mut TraceLog,
) -> Result<ComputeReport, FlowError>
where
    N: Namespace + ?Sized,
    E: Executor<N> + ?Sized,
{
    let mut computed: FxHashSet<String> = FxHashSet::default();
    let mut report = ComputeReport::default();

    while !paths.is_empty() {
        report.passes += 1;
        let mut progressed = false;
        let mut i = 0;

        while i < paths.len() {
            progressed |= skip_satisfied(registry, &mut paths[i], &computed, &*ns, trace)?;

            let next = paths[i].next().map(str::to_string);
            let Some(target) = next else {
                // Target reached through this path
                paths.remove(i);
                progressed = true;
                continue;
            };

            if is_blocked(paths.as_slice(), i, &target, trace) {
                trace.push(TraceEvent::Deferred {
                    variable: target,
                    path: paths[i].to_string(),
                });
                i += 1;
                continue;
            }

            let outputs = run_cell(registry, &target, ns, exec, trace)?;
            computed.extend(outputs);
            report.executed.push(target);
            progressed = true;
            paths[i].advance();
            if paths[i].len() <= 1 {
                paths.remove(i);
            } else {
                i += 1;
            }
        }

        if !progressed {
            let stuck = &paths[0];
            return Err(FlowError::DependencyCycle {
                variable: stuck.next().unwrap_or_default().to_string(),
                path: stuck.to_string(),
            });
        }
    }

    trace.push(TraceEvent::Finished {
        computed: report.executed.clone(),
        passes: report.passes,
    });
    Ok(report)
}

/// Drop heads whose next variable needs no computation through this path.
/// Returns whether the path got shorter.
fn skip_satisfied<N: Namespace + ?Sized>(
    registry: &mut Registry,
    path: &mut VarPath,
    computed: &FxHashSet<String>,
    ns: &N,
    trace: &mut TraceLog,
) -> Result<bool, FlowError> {
    let mut advanced = false;
    while let (Some(dep), Some(target)) = (path.head(), path.next()) {
        let (dep, target) = (dep.to_string(), target.to_string());
        trace.push(TraceEvent::Examining {
            variable: target.clone(),
            path: path.to_string(),
        });

        let reason = if computed.contains(&target) {
            SkipReason::AlreadyComputed
        } else if !input_changed(registry, &target, &dep, ns, trace)? {
            SkipReason::Unchanged
        } else {
            break;
        };

        trace.push(TraceEvent::Skipped {
            variable: target,
            reason,
        });
        path.advance();
        advanced = true;
    }
    Ok(advanced)
}

/// Compare the fingerprint `target`'s cell recorded for `dep` with the
/// current one. Never-seen, unbound and unfingerprintable inputs count as
/// changed.
fn input_changed<N: Namespace + ?Sized>(
    registry: &mut Registry,
    target: &str,
    dep: &str,
    ns: &N,
    trace: &mut TraceLog,
) -> Result<bool, FlowError> {
    let cell = registry.rule_mut(target)?;
    let current = match ns.get(dep).map(hasher::fingerprint).transpose() {
        Ok(fp) => fp,
        Err(reason) => {
            trace.push(TraceEvent::InputUnfingerprintable {
                input: dep.to_string(),
                reason,
            });
            return Ok(true);
        }
    };

    let changed = match (cell.inputs.get_mut(dep), current) {
        (None, _) | (Some(None), _) => true,
        (Some(stored), None) => {
            // Known before, unbound now: forget it
            *stored = None;
            true
        }
        (Some(Some(last)), Some(now)) => *last != now,
    };

    if changed {
        let event = if ns.bound(dep) {
            TraceEvent::InputChanged {
                input: dep.to_string(),
                variable: target.to_string(),
            }
        } else {
            TraceEvent::InputUnbound {
                input: dep.to_string(),
                variable: target.to_string(),
            }
        };
        trace.push(event);
    }
    Ok(changed)
}

/// Whether another path still has upstream work before `target`.
fn is_blocked(paths: &[VarPath], current: usize, target: &str, trace: &mut TraceLog) -> bool {
    for (j, other) in paths.iter().enumerate() {
        if j == current {
            continue;
        }
        match other.position(target) {
            Some(k) if k > 1 => {
                trace.push(TraceEvent::SharedTarget {
                    variable: target.to_string(),
                    other_path: other.to_string(),
                    blocking: true,
                });
                return true;
            }
            Some(1) => {
                trace.push(TraceEvent::SharedTarget {
                    variable: target.to_string(),
                    other_path: other.to_string(),
                    blocking: false,
                });
            }
            _ => {}
        }
    }
    false
}

/// Execute the cell producing `target`, then record the current fingerprint
/// of every one of its inputs. Returns the outputs it still owns.
fn run_cell<N, E>(
    registry: &mut Registry,
    target: &str,
    ns: &mut N,
    exec: &mut E,
    trace: &mut TraceLog,
) -> Result<Vec<String>, FlowError>
where
    N: Namespace + ?Sized,
    E: Executor<N> + ?Sized,
{
    let id = registry.cell_id(target)?;
    let (body, outputs) = {
        let cell = registry.rule(target)?;
        // Outputs since re-registered elsewhere are no longer this cell's
        let live: Vec<String> = cell
            .outputs
            .iter()
            .filter(|o| registry.cell_id(o).ok() == Some(id))
            .cloned()
            .collect();
        (cell.body.clone(), live)
    };
    trace.push(TraceEvent::Computing {
        variable: target.to_string(),
        outputs: outputs.clone(),
    });

    exec.run(&body, ns)
        .map_err(|cause| FlowError::ComputationFailed {
            variable: target.to_string(),
            cause,
        })?;

    let cell = registry.rule_mut(target)?;
    for (input, stored) in cell.inputs.iter_mut() {
        *stored = hasher::fingerprint_of(&*ns, input).unwrap_or(None);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expander::expand;
    use crate::core::namespace::VarStore;
    use crate::core::test_support::SumExec;
    use crate::core::types::Body;
    use serde_json::json;

    fn compute(
        reg: &mut Registry,
        targets: &[&str],
        ns: &mut VarStore,
        exec: &mut SumExec,
    ) -> Result<(ComputeReport, TraceLog), FlowError> {
        let mut trace = TraceLog::new();
        let mut paths = expand(reg, targets, &mut trace)?;
        let report = resolve(reg, &mut paths, ns, exec, &mut trace)?;
        assert!(paths.is_empty());
        Ok((report, trace))
    }

    fn chain() -> Registry {
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("f1: b = a"));
        reg.register(["b"], ["c"], Body::from("f2: c = b"));
        reg
    }

    #[test]
    fn test_cf011_chain_runs_in_order() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        let (report, trace) = compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.runs, vec!["f1", "f2"]);
        assert_eq!(report.executed, vec!["b", "c"]);
        assert_eq!(ns.get("c"), Some(&json!(1)));
        assert_eq!(trace.paths(), vec!["a -> b -> c"]);
    }

    #[test]
    fn test_cf011_idempotent_second_call() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        exec.runs.clear();
        let (report, trace) = compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert!(exec.runs.is_empty());
        assert!(report.is_up_to_date());
        assert!(trace
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::Skipped { reason: SkipReason::Unchanged, .. })));
    }

    #[test]
    fn test_cf011_change_propagates() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();

        ns.set("a", 5);
        exec.runs.clear();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.runs, vec!["f1", "f2"]);
        assert_eq!(ns.get("c"), Some(&json!(5)));

        exec.runs.clear();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert!(exec.runs.is_empty());
    }

    #[test]
    fn test_cf011_same_value_rebound_is_unchanged() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        ns.set("a", 1);
        exec.runs.clear();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert!(exec.runs.is_empty());
    }

    #[test]
    fn test_cf011_unchanged_intermediate_stops_propagation() {
        // f1 clamps: b only depends on the sign of a
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("f1: b = sign a"));
        reg.register(["b"], ["c"], Body::from("f2: c = b"));
        let mut ns = VarStore::new();
        ns.set("a", 3);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();

        ns.set("a", 7);
        exec.runs.clear();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.runs, vec!["f1"]);
    }

    fn diamond() -> Registry {
        let mut reg = Registry::new();
        reg.register(["a"], ["b", "c"], Body::from("f1: b, c = a"));
        reg.register(["b", "d"], ["e"], Body::from("f2: e = b + d"));
        reg.register(["c", "d"], ["g"], Body::from("f3: g = c + d"));
        reg
    }

    #[test]
    fn test_cf011_diamond_runs_shared_cell_once() {
        let mut reg = diamond();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        ns.set("d", 10);
        let mut exec = SumExec::default();
        compute(&mut reg, &["e", "g"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.count("f1"), 1);
        assert_eq!(exec.count("f2"), 1);
        assert_eq!(exec.count("f3"), 1);
        assert_eq!(ns.get("e"), Some(&json!(11)));
        assert_eq!(ns.get("g"), Some(&json!(11)));

        ns.set("a", 2);
        exec.runs.clear();
        compute(&mut reg, &["e", "g"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.count("f1"), 1);
        assert_eq!(exec.count("f2"), 1);
        assert_eq!(exec.count("f3"), 1);
        assert_eq!(ns.get("e"), Some(&json!(12)));
        // f1 ran before both consumers
        assert_eq!(exec.runs[0], "f1");
    }

    #[test]
    fn test_cf011_diamond_only_side_input_changed() {
        let mut reg = diamond();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        ns.set("d", 10);
        let mut exec = SumExec::default();
        compute(&mut reg, &["e", "g"], &mut ns, &mut exec).unwrap();

        ns.set("d", 20);
        exec.runs.clear();
        compute(&mut reg, &["e", "g"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.count("f1"), 0);
        assert_eq!(exec.count("f2"), 1);
        assert_eq!(exec.count("f3"), 1);
    }

    #[test]
    fn test_cf011_collision_at_index_one_does_not_defer() {
        // [a, t] and [b, t]: t sits at index 1 in both, so neither blocks
        let mut reg = Registry::new();
        reg.register(["a", "b"], ["t"], Body::from("ft: t = a + b"));
        let mut ns = VarStore::new();
        ns.set("a", 1);
        ns.set("b", 2);
        let mut exec = SumExec::default();
        let (report, trace) = compute(&mut reg, &["t"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.runs, vec!["ft"]);
        assert_eq!(report.passes, 1);
        assert!(!trace
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::Deferred { .. })));
        assert!(trace.events().iter().any(|e| matches!(
            e,
            TraceEvent::SharedTarget { blocking: false, .. }
        )));
    }

    #[test]
    fn test_cf011_collision_at_index_two_defers() {
        // [b, t] must wait for [x, a, t] to bring a up to date first
        let mut reg = Registry::new();
        reg.register(["b", "a"], ["t"], Body::from("ft: t = a + b"));
        reg.register(["x"], ["a"], Body::from("fa: a = x"));
        let mut ns = VarStore::new();
        ns.set("x", 4);
        ns.set("b", 2);
        let mut exec = SumExec::default();
        let mut trace = TraceLog::new();
        let mut paths = expand(&reg, &["t"], &mut trace).unwrap();
        assert_eq!(
            paths.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            vec!["b -> t", "x -> a -> t"]
        );
        resolve(&mut reg, &mut paths, &mut ns, &mut exec, &mut trace).unwrap();
        assert_eq!(exec.runs, vec!["fa", "ft"]);
        assert_eq!(ns.get("t"), Some(&json!(6)));
        assert!(trace
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::Deferred { variable, .. } if variable == "t")));
    }

    #[test]
    fn test_cf011_unknown_leaf_always_changed() {
        let mut reg = Registry::new();
        reg.register(["ghost"], ["out"], Body::from("fo: out = ghost"));
        let mut ns = VarStore::new();
        let mut exec = SumExec::default();
        for _ in 0..3 {
            compute(&mut reg, &["out"], &mut ns, &mut exec).unwrap();
        }
        assert_eq!(exec.count("fo"), 3);
        assert!(reg.rule("out").unwrap().last_fingerprint("ghost").is_none());
    }

    #[test]
    fn test_cf011_unbinding_clears_fingerprint() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert!(reg.rule("b").unwrap().last_fingerprint("a").is_some());

        ns.unset("a");
        exec.runs.clear();
        let (_, trace) = compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.count("f1"), 1);
        assert!(reg.rule("b").unwrap().last_fingerprint("a").is_none());
        assert!(trace
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::InputUnbound { input, .. } if input == "a")));
    }

    #[test]
    fn test_cf011_computation_failure_aborts() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("f1: b = a"));
        reg.register(["b"], ["c"], Body::from("fail"));
        let mut ns = VarStore::new();
        ns.set("a", 1);
        let mut exec = SumExec::default();
        let err = compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap_err();
        match err {
            FlowError::ComputationFailed { variable, .. } => assert_eq!(variable, "c"),
            other => panic!("expected computation failure, got {:?}", other),
        }
        // f1's fingerprints stand: retrying only re-runs the failed cell
        assert!(reg.rule("b").unwrap().last_fingerprint("a").is_some());
        exec.runs.clear();
        let _ = compute(&mut reg, &["c"], &mut ns, &mut exec);
        assert_eq!(exec.runs, vec!["fail"]);
    }

    #[test]
    fn test_cf011_stuck_paths_report_cycle() {
        // Hand-built paths that wait on each other
        let mut reg = Registry::new();
        reg.register(["u", "q"], ["t"], Body::from("ft: t = u + q"));
        reg.register(["p", "t"], ["u"], Body::from("fu: u = p + t"));
        let mut paths = vec![
            VarPath::from_vars(["p", "u", "t"]),
            VarPath::from_vars(["q", "t", "u"]),
        ];
        let mut ns = VarStore::new();
        let mut exec = SumExec::default();
        let mut trace = TraceLog::new();
        let err = resolve(&mut reg, &mut paths, &mut ns, &mut exec, &mut trace).unwrap_err();
        assert!(matches!(err, FlowError::DependencyCycle { .. }));
        assert!(exec.runs.is_empty());
    }

    #[test]
    fn test_cf011_reregistration_uses_new_rule() {
        let mut reg = chain();
        let mut ns = VarStore::new();
        ns.set("a", 1);
        ns.set("z", 100);
        let mut exec = SumExec::default();
        compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();

        reg.register(["z"], ["b"], Body::from("f1z: b = z"));
        exec.runs.clear();
        let (_, trace) = compute(&mut reg, &["c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.runs, vec!["f1z", "f2"]);
        assert_eq!(ns.get("c"), Some(&json!(100)));
        assert_eq!(trace.paths(), vec!["z -> b -> c"]);
    }

    #[test]
    fn test_cf011_reassigned_co_output_not_marked_computed() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b", "c"], Body::from("f1: b, c = a"));
        reg.register(["z"], ["c"], Body::from("fc: c = z"));
        let mut ns = VarStore::new();
        ns.set("a", 1);
        ns.set("z", 9);
        let mut exec = SumExec::default();
        let (report, _) = compute(&mut reg, &["b", "c"], &mut ns, &mut exec).unwrap();
        assert_eq!(exec.count("f1"), 1);
        assert_eq!(exec.count("fc"), 1);
        assert_eq!(report.executed, vec!["b", "c"]);
        assert_eq!(ns.get("c"), Some(&json!(9)));
    }

    /// A value with no byte form at all.
    struct Opaque;

    impl serde::Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no bytes"))
        }
    }

    struct OpaqueNs(Opaque);

    impl Namespace for OpaqueNs {
        type Value = Opaque;

        fn get(&self, name: &str) -> Option<&Opaque> {
            (name == "a").then_some(&self.0)
        }
    }

    #[test]
    fn test_cf011_unfingerprintable_input_always_changed() {
        let mut reg = Registry::new();
        reg.register(["a"], ["b"], Body::from("fb"));
        let mut ns = OpaqueNs(Opaque);
        let mut runs = 0;

        for _ in 0..3 {
            let mut trace = TraceLog::new();
            let mut paths = expand(&reg, &["b"], &mut trace).unwrap();
            let mut exec = |_: &Body, _: &mut OpaqueNs| {
                runs += 1;
                Ok::<(), String>(())
            };
            resolve(&mut reg, &mut paths, &mut ns, &mut exec, &mut trace).unwrap();

            let reason = trace.events().iter().find_map(|e| match e {
                TraceEvent::InputUnfingerprintable { input, reason } if input == "a" => {
                    Some(reason.clone())
                }
                _ => None,
            });
            assert_eq!(reason.as_deref(), Some("no bytes"));
            assert!(trace.render().contains("variable a cannot be fingerprinted: no bytes\n"));
        }
        assert_eq!(runs, 3);
        assert!(reg.rule("b").unwrap().last_fingerprint("a").is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_second_resolve_runs_nothing(
                depth in 1usize..6,
                seed in -50i64..50,
                bump in prop::option::of(1i64..5),
            ) {
                let mut reg = Registry::new();
                for k in 0..depth {
                    let body = format!("f{}: v{} = v{}", k + 1, k + 1, k);
                    reg.register([format!("v{}", k)], [format!("v{}", k + 1)], Body::new(body));
                }
                let target = format!("v{}", depth);
                let mut ns = VarStore::new();
                ns.set("v0", seed);
                let mut exec = SumExec::default();

                compute(&mut reg, &[target.as_str()], &mut ns, &mut exec).unwrap();
                prop_assert_eq!(exec.runs.len(), depth);

                if let Some(b) = bump {
                    ns.set("v0", seed + b);
                    exec.runs.clear();
                    compute(&mut reg, &[target.as_str()], &mut ns, &mut exec).unwrap();
                    prop_assert_eq!(exec.runs.len(), depth);
                }

                exec.runs.clear();
                compute(&mut reg, &[target.as_str()], &mut ns, &mut exec).unwrap();
                prop_assert!(exec.runs.is_empty());
                prop_assert_eq!(ns.get(&target), Some(&json!(seed + bump.unwrap_or(0))));
            }
        }
    }
}
