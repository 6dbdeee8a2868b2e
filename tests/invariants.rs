//! Property tests for the cross-cutting invariants listed for `ReconTree`,
//! `Target` entity merging, and the `Loop`'s failure-streak/repetition
//! detection.

use proptest::prelude::*;

use pentecter::application::evaluation::detects_repetition;
use pentecter::domain::models::{CommandEntry, CommandHistory, Entity, ReconTree, Target};

fn port_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![Just(80u16), Just(443), Just(8080), Just(22), Just(3000)]
}

fn service_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("http"), Just("https"), Just("ssh"), Just("ftp")]
}

proptest! {
    /// Invariant 1: pending + complete + in-progress == total, and active
    /// never exceeds max_parallel, after any sequence of AddPort/NextBatch/
    /// StartTask/FinishTask operations.
    #[test]
    fn recon_tree_counts_stay_consistent(
        ops in prop::collection::vec((port_strategy(), service_strategy(), any::<bool>()), 1..20)
    ) {
        let tree = ReconTree::with_max_parallel("10.0.0.1", 2);
        for (port, service, drain) in ops {
            tree.add_port(port, service, "banner");
            if drain {
                for task in tree.next_batch() {
                    if tree.start_task(&task) {
                        tree.finish_task(&task);
                    }
                }
            }
            let total = tree.count_total();
            let pending = tree.count_pending();
            let complete = tree.count_complete();
            let in_progress = total - pending - complete;
            prop_assert_eq!(pending + complete + in_progress, total);
            prop_assert!(tree.active() <= 2);
        }
    }

    /// Invariant 2: AddPort is idempotent on the port number; a second call
    /// never creates a duplicate node regardless of banner/service content.
    #[test]
    fn add_port_twice_never_duplicates(
        port in port_strategy(),
        service in service_strategy(),
        banner_a in "[a-zA-Z0-9 /.]{0,20}",
        banner_b in "[a-zA-Z0-9 /.]{0,40}",
    ) {
        let tree = ReconTree::new("10.0.0.1");
        tree.add_port(port, service, banner_a);
        let before = tree.count_total();
        tree.add_port(port, service, banner_b.clone());
        let after = tree.count_total();
        prop_assert_eq!(before, after);
        if service.contains("http") && !banner_b.is_empty() {
            prop_assert!(tree.render_tree().contains(&banner_b));
        }
    }

    /// Invariant 4: AddEntities yields a duplicate-free superset that
    /// preserves the order of first occurrence.
    #[test]
    fn add_entities_dedupes_and_preserves_order(
        batches in prop::collection::vec(
            prop::collection::vec((0usize..4, 0usize..4), 0..6),
            1..8
        )
    ) {
        let target = Target::new(1, "10.0.0.1");
        let mut expected_order: Vec<(String, String)> = Vec::new();
        for batch in &batches {
            let entities: Vec<Entity> = batch
                .iter()
                .map(|(k, v)| Entity::new(format!("kind{k}"), format!("val{v}")))
                .collect();
            target.add_entities(entities.clone());
            for e in &entities {
                let key = (e.kind.clone(), e.value.clone());
                if !expected_order.contains(&key) {
                    expected_order.push(key);
                }
            }
        }
        let snapshot = target.snapshot_entities();
        let actual: Vec<(String, String)> = snapshot.iter().map(|e| (e.kind.clone(), e.value.clone())).collect();

        let mut seen = std::collections::HashSet::new();
        for pair in &actual {
            prop_assert!(seen.insert(pair.clone()), "duplicate entity in snapshot: {:?}", pair);
        }
        prop_assert_eq!(actual, expected_order);
    }

    /// Invariant 8: the repetition detector fires iff some binary appears
    /// 3+ times among the last <= 5 history entries.
    #[test]
    fn repetition_detector_matches_manual_count(
        binaries in prop::collection::vec(prop_oneof![Just("nmap"), Just("ffuf"), Just("curl"), Just("echo")], 0..12)
    ) {
        let mut history = CommandHistory::new();
        for b in &binaries {
            history.push(CommandEntry::new(format!("{b} arg"), 0, "ok"));
        }
        let window: Vec<&str> = binaries.iter().rev().take(5).cloned().collect();
        let expected = window.iter().any(|b| window.iter().filter(|x| *x == b).count() >= 3);
        prop_assert_eq!(detects_repetition(&history), expected);
    }
}
