//! Per-call context handed to every engine operation.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::repository::Store;

/// Who is asking, as already resolved by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub team_id: Option<Uuid>,
    pub super_admin: bool,
}

impl Caller {
    pub fn super_admin() -> Self {
        Self {
            team_id: None,
            super_admin: true,
        }
    }

    pub fn member_of(team_id: Uuid) -> Self {
        Self {
            team_id: Some(team_id),
            super_admin: false,
        }
    }

    pub fn belongs_to(&self, team_id: Uuid) -> bool {
        self.super_admin || self.team_id == Some(team_id)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tunables of the scheduling engine.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// Non-final jobs older than this are killed before a new schedule.
    pub stale_after: Duration,
    /// Only export-controlled components may be scheduled.
    pub require_export_control: bool,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(24),
            require_export_control: true,
        }
    }
}

pub struct Context<'a, S: ?Sized> {
    pub caller: &'a Caller,
    pub store: &'a mut S,
    pub clock: &'a dyn Clock,
    pub policy: &'a SchedulePolicy,
}

impl<'a, S: Store + ?Sized> Context<'a, S> {
    pub fn new(
        caller: &'a Caller,
        store: &'a mut S,
        clock: &'a dyn Clock,
        policy: &'a SchedulePolicy,
    ) -> Self {
        Self {
            caller,
            store,
            clock,
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, Utc};

    use super::Clock;

    /// Clock that only moves when told to.
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self(Mutex::new(now))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
