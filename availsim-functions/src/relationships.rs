//! Steady-state reliability relationships between availability, mean time
//! between failures and mean repair time.

/// Mean time between failures that yields `availability` given `mean_repair_time`.
///
/// Derived from `A = MTBF / (MTBF + MTTR)`. Returns infinity for `A == 1`.
pub fn mean_time_between_failure(availability: f64, mean_repair_time: f64) -> f64 {
    mean_repair_time * availability / (1.0 - availability)
}

/// Steady-state availability of a component.
pub fn availability(mean_time_between_failure: f64, mean_repair_time: f64) -> f64 {
    mean_time_between_failure / (mean_time_between_failure + mean_repair_time)
}

/// `99.95` -> `0.9995`.
pub fn percent(value: f64) -> f64 {
    value / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sla_example() {
        let mtbf = mean_time_between_failure(percent(99.95), 120.0);
        assert!((mtbf - 239_880.0).abs() < 1e-6);
    }

    #[test]
    fn perfect_availability_never_fails() {
        assert!(mean_time_between_failure(1.0, 10.0).is_infinite());
    }

    proptest! {
        #[test]
        fn availability_inverts_mtbf(a in 0.01f64..0.9999, mttr in 0.1f64..10_000.0) {
            let mtbf = mean_time_between_failure(a, mttr);
            prop_assert!((availability(mtbf, mttr) - a).abs() < 1e-9);
        }
    }
}
