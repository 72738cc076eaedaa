use chrono::Utc;

/// Any epoch value below this one means the device clock has not been synchronised yet
/// (2021-01-01T00:00:00Z).
pub const MIN_PLAUSIBLE_EPOCH: i64 = 1_609_459_200;

/// Source of the current time, in seconds since the Unix epoch.
///
/// Devices without a battery backed RTC report small values until the time is synchronised,
/// so callers must not assume the returned value is the wall clock.
pub trait Clock {
    fn now(&self) -> i64;

    fn is_plausible(&self) -> bool {
        is_plausible(self.now())
    }
}

pub fn is_plausible(epoch: i64) -> bool {
    epoch >= MIN_PLAUSIBLE_EPOCH
}

/// Clock backed by the operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

// Accept closures as Clock implementations
impl<F> Clock for F
where
    F: Fn() -> i64,
{
    fn now(&self) -> i64 {
        self()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Manually driven clock shared between a test and the component under test.
    pub(crate) fn manual_clock(start: i64) -> (Rc<Cell<i64>>, impl Clock + Clone) {
        let now = Rc::new(Cell::new(start));
        let handle = now.clone();
        (handle, move || now.get())
    }

    #[test]
    fn system_clock_is_plausible() {
        assert!(SystemClock.is_plausible());
    }

    #[test]
    fn unset_clock_is_not_plausible() {
        let (now, clock) = manual_clock(42);
        assert!(!clock.is_plausible());
        now.set(MIN_PLAUSIBLE_EPOCH);
        assert!(clock.is_plausible());
    }
}
