//! Exponential backoff with full jitter (spec §4.E): base 1 s, cap 5 min,
//! deterministic in tests when an injected RNG is supplied.

use std::time::Duration;

use rand::Rng;

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(5 * 60);

pub trait JitterSource: Send + Sync + 'static {
    /// Uniform sample in `[0.0, 1.0)`.
    fn sample(&self) -> f64;
}

#[derive(Clone, Copy, Default)]
pub struct SystemJitter;

impl JitterSource for SystemJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Fixed jitter sample for deterministic tests.
#[derive(Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// `delay = uniform(0, min(cap, base * 2^attempt))`, per the "full jitter"
/// algorithm (AWS architecture blog's backoff taxonomy, the variant named
/// explicitly in spec §4.E).
pub fn full_jitter(attempt: u32, jitter: &dyn JitterSource) -> Duration {
    let exp = BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(CAP);
    let sample = jitter.sample().clamp(0.0, 1.0);
    capped.mul_f64(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_cap() {
        for attempt in 0..32 {
            let d = full_jitter(attempt, &FixedJitter(1.0));
            assert!(d <= CAP, "attempt {attempt} exceeded cap: {d:?}");
        }
    }

    #[test]
    fn zero_sample_yields_zero_delay() {
        assert_eq!(full_jitter(3, &FixedJitter(0.0)), Duration::ZERO);
    }

    #[test]
    fn base_case_is_bounded_by_base() {
        let d = full_jitter(0, &FixedJitter(1.0));
        assert_eq!(d, BASE);
    }
}
