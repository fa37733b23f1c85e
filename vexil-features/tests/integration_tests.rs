//! Integration tests for vexil-features

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use vexil_audit::MemorySink;
use vexil_features::bucket::bucket;
use vexil_features::targeting::decide;
use vexil_features::{
    ExperimentEngine, FlagRegistry, FlagSystem, FlagUpdate, ManualClock, RolloutStrategy, TargetSet,
    User, Variant,
};

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn user(id: impl Into<String>) -> User {
    let id = id.into();
    let email = format!("{}@test.com", id);
    User::new(id, email)
}

fn enabled_registry(key: &str, strategy: RolloutStrategy) -> (FlagRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let registry = FlagRegistry::with_clock(clock.clone());
    registry.create(key, key, "");
    registry
        .update(key, FlagUpdate::new().enabled(true).strategy(strategy))
        .unwrap();
    (registry, clock)
}

#[test]
fn test_percentage_rollout_distribution() {
    let (registry, _) = enabled_registry("rollout", RolloutStrategy::percentage(0.5).unwrap());

    let enabled = (0..1000)
        .filter(|i| registry.is_enabled("rollout", &user(format!("user-{}", i))))
        .count();

    // rollout:user-{0..1000} has 493 keys below bucket 0.5
    assert_eq!(enabled, 493);
}

#[test]
fn test_canary_reference_users() {
    let (registry, _) = enabled_registry("canary", RolloutStrategy::canary(0.05).unwrap());

    let enabled: Vec<usize> = (0..200)
        .filter(|i| registry.is_enabled("canary", &user(format!("user-{}", i))))
        .collect();

    assert_eq!(enabled, vec![29, 69, 91, 104, 131, 156, 157, 177, 183, 199]);
}

#[test]
fn test_gradual_rollout_over_time() {
    let (registry, clock) = enabled_registry("ramp", RolloutStrategy::Gradual);
    let users: Vec<User> = (0..500).map(|i| user(format!("user-{}", i))).collect();

    let mut previous = 0;
    for _ in 0..=10 {
        let count = users
            .iter()
            .filter(|u| registry.is_enabled("ramp", u))
            .count();
        assert!(count >= previous);
        previous = count;
        clock.advance(Duration::hours(1));
    }

    assert_eq!(previous, users.len());
}

#[test]
fn test_concurrent_counters_are_exact() {
    let (registry, _) = enabled_registry("hot", RolloutStrategy::percentage(0.3).unwrap());
    let threads = 8;
    let per_thread = 500;

    let expected_enabled: u64 = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = &registry;
                scope.spawn(move || {
                    (0..per_thread)
                        .filter(|i| registry.is_enabled("hot", &user(format!("t{}-{}", t, i))))
                        .count() as u64
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    let flag = registry.get("hot").unwrap();
    assert_eq!(flag.evaluations(), (threads * per_thread) as u64);
    assert_eq!(flag.enabled_count(), expected_enabled);
    assert_eq!(registry.engine().evaluations(), (threads * per_thread) as u64);
}

#[test]
fn test_snapshot_never_shows_more_enabled_than_evaluations() {
    let (registry, _) = enabled_registry("hot", RolloutStrategy::AllUsers);
    let flag = registry.get("hot").unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let registry = &registry;
            scope.spawn(move || {
                for i in 0..1000 {
                    registry.is_enabled("hot", &user(format!("{}-{}", t, i)));
                }
            });
        }

        scope.spawn(|| {
            for _ in 0..1000 {
                let snapshot = flag.snapshot();
                assert!(snapshot.enabled_count <= snapshot.evaluations);
            }
        });
    });

    assert_eq!(flag.evaluations(), 4000);
    assert_eq!(flag.enabled_count(), 4000);
}

#[test]
fn test_kill_switch_during_rollout() {
    let system = FlagSystem::new();
    system.registry().create("new_ui", "New UI", "");
    system
        .registry()
        .update("new_ui", FlagUpdate::new().enabled(true))
        .unwrap();

    let users: Vec<User> = (0..50).map(|i| user(i.to_string())).collect();
    assert!(users.iter().all(|u| system.is_enabled("new_ui", u)));

    assert!(system.kill_switch().activate("new_ui", "Performance issues detected"));
    assert!(users.iter().all(|u| !system.is_enabled("new_ui", u)));

    assert!(system.kill_switch().deactivate("new_ui"));
    assert!(users.iter().all(|u| system.is_enabled("new_ui", u)));

    let stats = system.flag_stats("new_ui").unwrap();
    assert_eq!(stats.evaluations, 150);
    assert_eq!(stats.enabled_count, 100);
}

#[test]
fn test_kill_switch_audit_reaches_sink() {
    let sink = MemorySink::new();
    let system = FlagSystem::builder()
        .audit_sink(Arc::new(sink.clone()))
        .build()
        .unwrap();
    system.registry().create("payments_v2", "Payments", "");

    system.kill_switch().activate("payments_v2", "error rate 12%");
    system.kill_switch().deactivate("payments_v2");

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action, vexil_audit::AuditAction::KillSwitchActivated);
    assert_eq!(records[0].reason.as_deref(), Some("error rate 12%"));
    assert_eq!(records[1].action, vexil_audit::AuditAction::KillSwitchDeactivated);
}

#[test]
fn test_experiment_simulation() {
    let engine = ExperimentEngine::new();
    let id = engine
        .create_experiment("New Checkout", "old_checkout", "new_checkout", 0.5)
        .unwrap();
    assert_eq!(id.as_str(), "exp-0");

    let mut rng = StdRng::seed_from_u64(42);
    let mut assigned = 0;
    let mut converted = 0;

    for i in 0..1000 {
        let u = user(format!("user-{}", i));
        let variant = engine.assign_variant(&id, &u).unwrap();
        assigned += 1;

        let rate = match variant {
            Variant::A => 0.10,
            Variant::B => 0.15,
        };
        if rng.random_bool(rate) {
            assert_eq!(engine.record_conversion(&id, &u), Some(variant));
            converted += 1;
        }
    }

    let results = engine.get_results(&id).unwrap();
    assert_eq!(
        results.variant_a.users + results.variant_b.users,
        assigned + converted
    );
    assert_eq!(
        results.variant_a.conversions + results.variant_b.conversions,
        converted
    );
    assert!(results.lift >= 0.0 && results.lift <= 1.0);
}

#[test]
fn test_concurrent_experiment_counters_are_exact() {
    let engine = ExperimentEngine::new();
    let id = engine.create_default("checkout", "old_checkout", "new_checkout");
    let threads = 8;
    let per_thread = 250;

    let (assigned, converted): (Vec<Variant>, Vec<Variant>) = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let engine = &engine;
                let id = &id;
                scope.spawn(move || {
                    let mut assigned = Vec::new();
                    let mut converted = Vec::new();
                    for i in 0..per_thread {
                        let u = user(format!("t{}-{}", t, i));
                        assigned.push(engine.assign_variant(id, &u).unwrap());
                        if i % 3 == 0 {
                            converted.push(engine.record_conversion(id, &u).unwrap());
                        }
                    }
                    (assigned, converted)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .fold((Vec::new(), Vec::new()), |(mut a, mut c), (ta, tc)| {
                a.extend(ta);
                c.extend(tc);
                (a, c)
            })
    });

    let count = |variants: &[Variant], v: Variant| variants.iter().filter(|x| **x == v).count() as u64;
    let results = engine.get_results(&id).unwrap();

    // Every conversion also counts as an assignment
    let calls = (assigned.len() + converted.len()) as u64;
    assert_eq!(results.variant_a.users + results.variant_b.users, calls);
    assert_eq!(
        results.variant_a.users,
        count(&assigned, Variant::A) + count(&converted, Variant::A)
    );
    assert_eq!(results.variant_a.conversions, count(&converted, Variant::A));
    assert_eq!(results.variant_b.conversions, count(&converted, Variant::B));
    assert_eq!(
        results.variant_a.conversions + results.variant_b.conversions,
        converted.len() as u64
    );
}

#[test]
fn test_experiment_split_reference_count() {
    let engine = ExperimentEngine::new();
    let id = engine.create_default("split", "a", "b");

    for i in 0..1000 {
        engine.assign_variant(&id, &user(format!("user-{}", i)));
    }

    // exp-0:user-{0..1000} has 492 keys below bucket 0.5
    let results = engine.get_results(&id).unwrap();
    assert_eq!(results.variant_a.users, 492);
    assert_eq!(results.variant_b.users, 508);
}

#[test]
fn test_strategy_roundtrip_through_json_config() {
    let json = r#"{"type":"targeted","users":["vip"],"attributes":{"plan":"pro","seats":10}}"#;
    let strategy: RolloutStrategy = serde_json::from_str(json).unwrap();
    let (registry, _) = enabled_registry("pro_only", strategy);

    assert!(registry.is_enabled("pro_only", &user("vip")));
    assert!(registry.is_enabled("pro_only", &user("a").with_attribute("plan", "pro")));
    assert!(registry.is_enabled("pro_only", &user("b").with_attribute("seats", 10.0)));
    assert!(!registry.is_enabled("pro_only", &user("c").with_attribute("plan", "free")));
}

fn any_strategy() -> impl Strategy<Value = RolloutStrategy> {
    prop_oneof![
        Just(RolloutStrategy::AllUsers),
        (0.0f64..=1.0).prop_map(|p| RolloutStrategy::percentage(p).unwrap()),
        "[a-zA-Z0-9-]{1,16}".prop_map(|id| {
            RolloutStrategy::targeted(
                TargetSet::new()
                    .with_user(id)
                    .with_group("premium")
                    .with_attribute("plan", "pro"),
            )
        }),
        Just(RolloutStrategy::Gradual),
        (0.0f64..=1.0).prop_map(|p| RolloutStrategy::canary(p).unwrap()),
        Just(RolloutStrategy::Unknown),
    ]
}

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(
        key in "[a-z_]{1,12}",
        id in "[a-zA-Z0-9-]{1,16}",
        pct in 0.0f64..=1.0,
    ) {
        let strategy = RolloutStrategy::percentage(pct).unwrap();
        let u = user(id);
        let first = decide(&key, true, &strategy, start(), &u, start());
        for _ in 0..3 {
            prop_assert_eq!(decide(&key, true, &strategy, start(), &u, start()), first);
        }
    }

    #[test]
    fn prop_percentage_is_monotonic(
        key in "[a-z_]{1,12}",
        id in "[a-zA-Z0-9-]{1,16}",
        low in 0.0f64..=1.0,
        high in 0.0f64..=1.0,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let u = user(id);
        let on_low = decide(&key, true, &RolloutStrategy::percentage(low).unwrap(), start(), &u, start());
        let on_high = decide(&key, true, &RolloutStrategy::percentage(high).unwrap(), start(), &u, start());
        prop_assert!(!on_low || on_high);
    }

    #[test]
    fn prop_gradual_saturates_after_ten_hours(
        key in "[a-z_]{1,12}",
        id in "[a-zA-Z0-9-]{1,16}",
        extra_minutes in 0i64..100_000,
    ) {
        let now = start() + Duration::hours(10) + Duration::minutes(extra_minutes);
        prop_assert!(decide(&key, true, &RolloutStrategy::Gradual, start(), &user(id), now));
    }

    #[test]
    fn prop_canary_is_subset_of_percentage(
        key in "[a-z_]{1,12}",
        id in "[a-zA-Z0-9-]{1,16}",
        pct in 0.0f64..=1.0,
    ) {
        let u = user(id);
        let canary = decide(&key, true, &RolloutStrategy::canary(pct).unwrap(), start(), &u, start());
        let percentage = decide(&key, true, &RolloutStrategy::percentage(pct).unwrap(), start(), &u, start());
        prop_assert!(!canary || percentage);
        if pct > 0.05 {
            prop_assert!(!canary);
        }
    }

    #[test]
    fn prop_disabled_flag_is_always_off(
        key in "[a-z_]{1,12}",
        id in "[a-zA-Z0-9-]{1,16}",
        strategy in any_strategy(),
        elapsed_hours in 0i64..1000,
    ) {
        let u = user(id).with_group("premium").with_attribute("plan", "pro");
        let now = start() + Duration::hours(elapsed_hours);
        prop_assert!(!decide(&key, false, &strategy, start(), &u, now));
    }

    #[test]
    fn prop_experiment_assignment_is_stable(
        id in "[a-zA-Z0-9-]{1,16}",
        split in 0.0f64..=1.0,
    ) {
        let engine = ExperimentEngine::new();
        let exp = engine.create_experiment("prop", "a", "b", split).unwrap();
        let u = user(id);

        let assigned = engine.assign_variant(&exp, &u).unwrap();
        prop_assert_eq!(engine.assign_variant(&exp, &u), Some(assigned));
        prop_assert_eq!(engine.record_conversion(&exp, &u), Some(assigned));
    }

    #[test]
    fn prop_bucket_in_unit_interval(key in ".*") {
        let b = bucket(&key);
        prop_assert!((0.0..1.0).contains(&b));
    }
}
