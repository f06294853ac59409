//! Property-based tests for recurrence expansion using proptest.
//!
//! These tests verify invariants that should hold for *any* valid spec, not
//! just the specific examples in `expander_tests.rs`.

use calendar_engine::{Frequency, RecurrenceEngine, RecurrenceSpec, Termination, WeekdayToken};
use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_freq() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Yearly),
    ]
}

fn arb_interval() -> impl Strategy<Value = u32> {
    1u32..=3
}

fn arb_count() -> impl Strategy<Value = u32> {
    1u32..=20
}

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    prop_oneof![
        Just(Weekday::Mon),
        Just(Weekday::Tue),
        Just(Weekday::Wed),
        Just(Weekday::Thu),
        Just(Weekday::Fri),
        Just(Weekday::Sat),
        Just(Weekday::Sun),
    ]
}

fn arb_timezone() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(chrono_tz::UTC),
        Just(chrono_tz::America::New_York),
        Just(chrono_tz::Europe::Berlin),
        Just(chrono_tz::Asia::Tokyo),
    ]
}

/// DTSTART in 2024-2026, day capped at 28 so every month has it.
fn arb_dtstart() -> impl Strategy<Value = DateTime<Utc>> {
    (2024i32..=2026, 1u32..=12, 1u32..=28, 0u32..=23)
        .prop_map(|(y, m, d, h)| Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
}

fn arb_spec() -> impl Strategy<Value = RecurrenceSpec> {
    (
        arb_freq(),
        arb_interval(),
        arb_dtstart(),
        proptest::collection::vec(arb_weekday(), 0..3),
    )
        .prop_map(|(freq, interval, dtstart, days)| {
            RecurrenceSpec::new(freq, dtstart)
                .with_interval(interval)
                .with_by_day(
                    days.into_iter()
                        .map(WeekdayToken::every)
                        .collect::<Vec<_>>(),
                )
                .normalize()
        })
}

/// A window wide enough to hold every COUNT-bounded series generated above.
fn everything_after(dtstart: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (dtstart - Duration::days(1), dtstart + Duration::days(366 * 65))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn instants_stay_inside_window_and_after_dtstart(
        spec in arb_spec(),
        tz in arb_timezone(),
        offset_days in 0i64..400,
        span_days in 0i64..120,
    ) {
        let window_start = spec.dtstart - Duration::days(30) + Duration::days(offset_days);
        let window_end = window_start + Duration::days(span_days);

        let result = RecurrenceEngine::in_timezone(tz)
            .occurrences_between(&spec, window_start, window_end)
            .unwrap();

        for instant in &result {
            prop_assert!(*instant >= window_start);
            prop_assert!(*instant <= window_end);
            prop_assert!(*instant >= spec.dtstart);
        }
    }

    #[test]
    fn instants_strictly_ascending(
        spec in arb_spec(),
        tz in arb_timezone(),
        span_days in 1i64..200,
    ) {
        let result = RecurrenceEngine::in_timezone(tz)
            .occurrences_between(&spec, spec.dtstart, spec.dtstart + Duration::days(span_days))
            .unwrap();

        for pair in result.windows(2) {
            prop_assert!(pair[0] < pair[1], "not ascending: {:?}", pair);
        }
    }

    #[test]
    fn count_yields_exactly_n(
        spec in arb_spec(),
        count in arb_count(),
    ) {
        let spec = spec.with_termination(Termination::Count(count));
        let (from, to) = everything_after(spec.dtstart);

        let result = RecurrenceEngine::utc()
            .occurrences_between(&spec, from, to)
            .unwrap();

        prop_assert_eq!(result.len(), count as usize);
    }

    #[test]
    fn until_is_never_exceeded(
        spec in arb_spec(),
        tz in arb_timezone(),
        until_days in 0i64..200,
    ) {
        let until = spec.dtstart + Duration::days(until_days);
        let spec = spec.with_termination(Termination::Until(until));

        let result = RecurrenceEngine::in_timezone(tz)
            .occurrences_between(&spec, spec.dtstart, until + Duration::days(400))
            .unwrap();

        for instant in &result {
            prop_assert!(*instant <= until);
        }
    }

    #[test]
    fn wire_form_round_trips(
        spec in arb_spec(),
        count in proptest::option::of(arb_count()),
    ) {
        let spec = match count {
            Some(n) => spec.with_termination(Termination::Count(n)),
            None => spec,
        };

        let parsed: RecurrenceSpec = spec.to_string().parse().unwrap();
        prop_assert_eq!(parsed, spec);
    }
}
