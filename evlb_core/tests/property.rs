use std::time::{Duration, Instant};

use evlb_core::{
    BalancerParameters, ChargerLimits, ChargerState, Context, Event, Reason, clamp_current,
    compute_available_current, distribute_current, recompute,
};
use evlb_traits::PowerReading;
use proptest::prelude::*;

prop_compose! {
    fn charger_limits()(min in 1u8..=16, span in 0u8..=32) -> ChargerLimits {
        ChargerLimits::new(f64::from(min), f64::from(min) + f64::from(span))
    }
}

proptest! {
    #[test]
    fn headroom_never_grows_with_house_load(
        service in 1.0f64..200.0,
        ev in 0.0f64..80.0,
        w1 in 0.0f64..200_000.0,
        extra in 0.0f64..50_000.0,
        voltage in 100.0f64..480.0,
    ) {
        let a1 = compute_available_current(service, ev, w1, voltage);
        let a2 = compute_available_current(service, ev, w1 + extra, voltage);
        prop_assert!(a2 <= a1);
    }

    #[test]
    fn clamp_stays_in_bounds(
        raw in -100.0f64..200.0,
        min_ev in 1u8..=32,
        max in 0u8..=80,
    ) {
        let min_ev = f64::from(min_ev);
        let max = f64::from(max);
        match clamp_current(raw, min_ev, max) {
            Some(a) => {
                prop_assert!(a >= min_ev && a <= max);
                prop_assert_eq!(a.fract(), 0.0);
            }
            None => prop_assert!(raw.min(max) < min_ev),
        }
        if raw.min(max) < min_ev {
            prop_assert!(clamp_current(raw, min_ev, max).is_none());
        }
    }

    #[test]
    fn water_filling_respects_pool_and_limits(
        pool in -20i16..400,
        chargers in prop::collection::vec(charger_limits(), 0..8),
    ) {
        let pool = f64::from(pool);
        let out = distribute_current(pool, &chargers);
        prop_assert_eq!(out.len(), chargers.len());
        let total: f64 = out.iter().sum();
        prop_assert!(total <= pool.max(0.0) + 1e-9);
        for (a, c) in out.iter().zip(&chargers) {
            prop_assert!(*a == 0.0 || (*a >= c.min_a && *a <= c.max_a), "{a} vs {c:?}");
        }
    }

    #[test]
    fn water_filling_ignores_order(
        pool in 0u16..400,
        chargers in prop::collection::vec(charger_limits(), 1..8),
        rotate in 0usize..8,
    ) {
        let pool = f64::from(pool);
        let forward = distribute_current(pool, &chargers);

        let mut reversed = chargers.clone();
        reversed.reverse();
        let mut back = distribute_current(pool, &reversed);
        back.reverse();
        prop_assert_eq!(&forward, &back);

        let k = rotate % chargers.len();
        let mut rotated = chargers.clone();
        rotated.rotate_left(k);
        let mut out = distribute_current(pool, &rotated);
        out.rotate_right(k);
        prop_assert_eq!(forward, out);
    }

    #[test]
    fn recompute_is_deterministic_and_stable(
        house in 0.0f64..20_000.0,
        max_charger in 0u8..=32,
    ) {
        let p = BalancerParameters {
            max_charger_current_a: f64::from(max_charger),
            ..BalancerParameters::default()
        };
        let now = Instant::now();
        let s0 = ChargerState::default();
        let ev = Event::Reading(PowerReading::watts(now, house));

        let first = recompute(&s0, &p, "c1", ev, Context::at(now));
        let again = recompute(&s0, &p, "c1", ev, Context::at(now));
        prop_assert_eq!(&first, &again);

        // The meter now also sees the EV at its new set-point: nothing changes.
        let (s1, _) = first;
        let later = now + Duration::from_secs(1);
        let seen = house + s1.current_set_a * p.supply_voltage_v;
        let (s2, t2) = recompute(
            &s1,
            &p,
            "c1",
            Event::Reading(PowerReading::watts(later, seen)),
            Context::at(later),
        );
        prop_assert!(t2.actions.is_empty());
        prop_assert_eq!(s2.current_set_a, s1.current_set_a);
    }

    #[test]
    fn repeated_event_requests_nothing(
        house in 0.0f64..20_000.0,
        prior in 0u8..=32,
        max_charger in 0u8..=32,
        dt in 0u64..120,
    ) {
        let p = BalancerParameters {
            max_charger_current_a: f64::from(max_charger),
            ..BalancerParameters::default()
        };
        let now = Instant::now();
        let mut s0 = ChargerState::default();
        s0.restore(f64::from(prior));
        let ev = Event::Reading(PowerReading::watts(now, house));
        let (s1, _) = recompute(&s0, &p, "c1", ev, Context::at(now));

        let later = now + Duration::from_secs(dt);
        let (s2, t2) = recompute(&s1, &p, "c1", ev, Context::at(later));
        prop_assert!(t2.actions.is_empty(), "reading: {:?}", t2.actions);
        prop_assert_eq!(s2.current_set_a, s1.current_set_a);

        let refresh = Event::Refresh { reason: Reason::ParameterChange };
        let (s3, t3) = recompute(&s1, &p, "c1", refresh, Context::at(later));
        prop_assert!(t3.actions.is_empty(), "refresh: {:?}", t3.actions);
        prop_assert_eq!(s3.current_set_a, s1.current_set_a);
    }

    #[test]
    fn never_increases_inside_cooldown(
        steps in prop::collection::vec((0.0f64..15_000.0, 1u64..20), 1..40),
    ) {
        let p = BalancerParameters::default();
        let ramp = p.ramp_up();
        let mut now = Instant::now();
        let mut s = ChargerState::default();
        let mut last_drop: Option<Instant> = None;

        for (house, dt) in steps {
            now += Duration::from_secs(dt);
            let seen = house + s.current_set_a * p.supply_voltage_v;
            let prev = s.current_set_a;
            let (next, _) = recompute(
                &s,
                &p,
                "c1",
                Event::Reading(PowerReading::watts(now, seen)),
                Context::at(now),
            );
            if next.current_set_a > prev {
                if let Some(t) = last_drop {
                    prop_assert!(now.duration_since(t) >= ramp);
                }
            }
            if next.current_set_a < prev {
                last_drop = Some(now);
            }
            prop_assert!(next.current_set_a <= p.max_charger_current_a);
            s = next;
        }
    }
}
