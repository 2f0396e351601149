use crate::config::AutoscaleConfig;

/// Desired worker count for a pending-job count.
///
/// One worker per pending job, floored at `min_workers` and, when
/// `max_workers > 0`, capped at `max_workers`. The cap wins if the bounds
/// are inverted.
pub fn desired_workers(config: &AutoscaleConfig, pending: i64) -> u32 {
    let wanted = if pending <= 0 {
        0
    } else {
        u32::try_from(pending).unwrap_or(u32::MAX)
    };

    let floored = wanted.max(config.min_workers);
    if config.max_workers > 0 {
        floored.min(config.max_workers)
    } else {
        floored
    }
}

/// Count provisioned on a cold start: at least one worker for queued work
pub fn cold_start_workers(config: &AutoscaleConfig) -> u32 {
    desired_workers(config, 1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min: u32, max: u32) -> AutoscaleConfig {
        AutoscaleConfig::new().with_min_workers(min).with_max_workers(max)
    }

    #[test]
    fn test_empty_queue_returns_min() {
        for (min, max) in [(0, 0), (2, 0), (1, 5), (3, 3)] {
            let c = config(min, max);
            assert_eq!(desired_workers(&c, 0), min);
            assert_eq!(desired_workers(&c, -4), min);
        }
    }

    #[test]
    fn test_one_worker_per_pending_job() {
        let c = config(0, 0);
        assert_eq!(desired_workers(&c, 1), 1);
        assert_eq!(desired_workers(&c, 7), 7);
        assert_eq!(desired_workers(&c, 10_000), 10_000);
    }

    #[test]
    fn test_bounds_hold() {
        let c = config(2, 6);
        for pending in -3..50 {
            let desired = desired_workers(&c, pending);
            assert!((2..=6).contains(&desired), "pending {} gave {}", pending, desired);
        }
    }

    #[test]
    fn test_monotonic() {
        for c in [config(0, 0), config(3, 0), config(1, 10), config(5, 2)] {
            let mut previous = desired_workers(&c, -1);
            for pending in 0..200 {
                let desired = desired_workers(&c, pending);
                assert!(desired >= previous);
                previous = desired;
            }
        }
    }

    #[test]
    fn test_inverted_bounds_clamp_to_max() {
        let c = config(5, 2);
        assert_eq!(desired_workers(&c, 0), 2);
        assert_eq!(desired_workers(&c, 100), 2);
    }

    #[test]
    fn test_huge_pending_saturates() {
        assert_eq!(desired_workers(&config(0, 0), i64::MAX), u32::MAX);
    }

    #[test]
    fn test_cold_start_workers() {
        assert_eq!(cold_start_workers(&config(0, 0)), 1);
        assert_eq!(cold_start_workers(&config(3, 0)), 3);
        assert_eq!(cold_start_workers(&config(3, 2)), 2);
    }
}
