use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use coherence_sim::memory_cache::is_exclusive;
use coherence_sim::*;
use proptest::prelude::*;
use rstest::rstest;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Asserts the single-writer invariant at every step the bus takes.
#[derive(Default)]
struct InvariantChecker {
    messages: AtomicU64,
    accesses: AtomicU64,
    violated: AtomicBool,
}

impl BusObserver for InvariantChecker {
    fn on_message(&self, _msg: BusMessage, caches: &[MesiState]) {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if !is_exclusive(caches) {
            self.violated.store(true, Ordering::SeqCst);
        }
    }

    fn on_access(&self, who: MemoryCacheId, intent: Intent, access: &Access, caches: &[MesiState]) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        let writer_not_owner = intent == Intent::Write && caches[who] != MesiState::Modified;
        if !is_exclusive(caches) || writer_not_owner || (intent == Intent::Write) != access.written.is_some() {
            self.violated.store(true, Ordering::SeqCst);
        }
    }
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(8)]
fn exclusivity_holds_at_every_transition(#[case] cores: usize) {
    init_logging();
    let checker = Arc::new(InvariantChecker::default());
    let config = SimConfig::default()
        .cores(cores)
        .iterations(500)
        .observer(checker.clone());

    let report = Simulation::new(config).unwrap().run(Mode::Coherent).unwrap();

    assert!(!checker.violated.load(Ordering::SeqCst));
    assert_eq!(checker.accesses.load(Ordering::SeqCst), cores as u64 * 500);
    assert_eq!(Some(checker.messages.load(Ordering::SeqCst)), report.messages());
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn seeded_final_value_matches_replayed_writes(#[case] cores: usize) {
    let pattern = WritePattern::Random { probability: 0.5, seed: Some(0xC0FFEE) };
    let iterations = 1000;

    let expected: u64 = (0..cores)
        .map(|core| pattern.decider(core).unwrap().take(iterations).filter(|&w| w).count() as u64)
        .sum();

    let config = SimConfig::default().cores(cores).iterations(iterations).pattern(pattern);
    let report = Simulation::new(config).unwrap().run(Mode::Coherent).unwrap();

    assert_eq!(report.writes, expected);
    assert_eq!(report.final_value, expected);
}

#[test]
fn single_core_always_writing() {
    let config = SimConfig::default().cores(1).iterations(100).pattern(WritePattern::Always);
    let report = Simulation::new(config).unwrap().run(Mode::Coherent).unwrap();
    // One fill, then an invalidation per write, owner or not.
    assert_eq!(report.messages(), Some(101));
    assert_eq!(report.final_value, 100);
}

#[rstest]
#[case(BroadcastPolicy::Always, 51)]
#[case(BroadcastPolicy::SkipWhenOwner, 2)]
fn single_core_alternating(#[case] broadcast: BroadcastPolicy, #[case] messages: u64) {
    let config = SimConfig::default()
        .cores(1)
        .iterations(100)
        .pattern(WritePattern::Alternating)
        .broadcast(broadcast);
    let report = Simulation::new(config).unwrap().run(Mode::Coherent).unwrap();
    assert_eq!(report.messages(), Some(messages));
    assert_eq!(report.final_value, 50);
}

#[test]
fn alternating_writers_cost_two_messages_each() {
    let bus = Bus::new(2, BroadcastPolicy::Always);
    let memory = MainMemory::new();
    for i in 0..1000 {
        bus.access(&memory, i % 2, Intent::Write);
    }
    assert_eq!(bus.messages(), 2000);
    assert_eq!(memory.read(), 1000);
}

#[test]
fn alternating_write_read_on_one_core() {
    let bus = Bus::new(2, BroadcastPolicy::Always);
    let memory = MainMemory::new();
    let mut decider = WritePattern::Alternating.decider(0).unwrap();
    for _ in 0..10 {
        bus.access(&memory, 0, decider.next_intent());
    }
    // W costs fill + invalidate, every later W re-broadcasts, R always hits.
    assert_eq!(bus.messages(), 2 + 4);
    assert_eq!(memory.read(), 5);
}

#[test]
fn classic_scenario() {
    init_logging();
    let report = Simulation::new(SimConfig::default()).unwrap().run(Mode::Coherent).unwrap();
    assert_eq!(report.cores, 2);
    assert_eq!(report.iterations, 1000);
    assert_eq!(report.final_value, report.writes);
    assert!(report.messages().unwrap() >= report.writes);
    assert!(report.messages().unwrap() <= 2 * 2000);
}

#[test]
fn skipping_owner_broadcasts_never_costs_more() {
    let pattern = WritePattern::Random { probability: 0.7, seed: Some(99) };
    let run = |broadcast: BroadcastPolicy| {
        let config = SimConfig::default().cores(1).iterations(500).pattern(pattern.clone()).broadcast(broadcast);
        Simulation::new(config).unwrap().run(Mode::Coherent).unwrap()
    };
    let always = run(BroadcastPolicy::Always);
    let skip = run(BroadcastPolicy::SkipWhenOwner);
    assert_eq!(always.final_value, skip.final_value);
    assert!(skip.messages().unwrap() <= always.messages().unwrap());
}

/// A second model of the protocol, tracked as an owner plus a sharer set.
#[derive(Default)]
struct Model {
    owner: Option<MemoryCacheId>,
    sharers: BTreeSet<MemoryCacheId>,
    messages: u64,
}

impl Model {
    fn access(&mut self, who: MemoryCacheId, write: bool) {
        if self.owner != Some(who) && !self.sharers.contains(&who) {
            self.messages += 1;
            if let Some(owner) = self.owner.take() {
                self.sharers.insert(owner);
            }
            self.sharers.insert(who);
        }
        if write {
            self.messages += 1;
            self.owner = Some(who);
            self.sharers.clear();
        }
    }

    fn states(&self, cores: usize) -> Vec<MesiState> {
        (0..cores)
            .map(|c| {
                if self.owner == Some(c) {
                    MesiState::Modified
                } else if self.sharers.contains(&c) {
                    MesiState::Shared
                } else {
                    MesiState::Invalid
                }
            })
            .collect()
    }
}

proptest! {
    #[test]
    fn sequential_accesses_match_model(ops in prop::collection::vec((0usize..4, any::<bool>()), 0..200)) {
        let bus = Bus::new(4, BroadcastPolicy::Always);
        let memory = MainMemory::new();
        let mut model = Model::default();
        let mut writes = 0;

        for &(who, write) in &ops {
            let intent = if write { Intent::Write } else { Intent::Read };
            bus.access(&memory, who, intent);
            model.access(who, write);
            writes += write as u64;

            let snapshot = bus.snapshot();
            prop_assert!(is_exclusive(&snapshot));
            prop_assert_eq!(snapshot, model.states(4));
        }

        prop_assert_eq!(bus.messages(), model.messages);
        prop_assert_eq!(memory.read(), writes);
    }
}
