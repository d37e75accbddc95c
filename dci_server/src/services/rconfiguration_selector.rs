//! Round-robin over the run configurations attached to a remoteci.
//!
//! The "next" configuration is derived from the one recorded on the most
//! recent job plus the current list membership. There is no rotation
//! counter and no lock: two concurrent schedules for the same remoteci may
//! pick the same configuration.

use std::cmp::Ordering;

use uuid::Uuid;

use super::context::Context;
use crate::error::SchedulerResult;
use crate::models::rconfiguration::RConfiguration;
use crate::repository::Store;

pub async fn last_used_configuration_id<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    remoteci_id: Uuid,
) -> SchedulerResult<Option<Uuid>> {
    ctx.store.last_rconfiguration_id(topic_id, remoteci_id).await
}

/// Newest first, ties broken by name.
fn rotation_order(a: &RConfiguration, b: &RConfiguration) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.name.cmp(&b.name))
}

/// Index of the configuration to use, given the ordered list and the last one used.
fn next_index(ordered: &[RConfiguration], last_used: Option<Uuid>) -> Option<usize> {
    if ordered.is_empty() {
        return None;
    }
    let len = ordered.len();
    let index = match last_used {
        // Nothing used yet: start from the oldest.
        None => len - 1,
        Some(last) => match ordered.iter().position(|c| c.id == last) {
            Some(i) => (i + len - 1) % len,
            None => 0,
        },
    };
    Some(index)
}

/// `None` means the remoteci has no configuration for the topic and the job
/// falls back to the topic's own component types.
pub async fn select_next<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    remoteci_id: Uuid,
) -> SchedulerResult<Option<RConfiguration>> {
    let mut configurations = ctx
        .store
        .rconfigurations_for_remoteci(remoteci_id, topic_id)
        .await?;
    if configurations.is_empty() {
        return Ok(None);
    }
    configurations.sort_by(rotation_order);

    let last_used = last_used_configuration_id(ctx, topic_id, remoteci_id).await?;
    let Some(index) = next_index(&configurations, last_used) else {
        return Ok(None);
    };
    let selected = configurations.swap_remove(index);

    tracing::debug!(
        remoteci_id = %remoteci_id,
        topic_id = %topic_id,
        rconfiguration = %selected.name,
        last_used = ?last_used,
        "Selected run configuration"
    );
    Ok(Some(selected))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::models::job::{Job, JobStatus};
    use crate::models::ResourceState;
    use crate::repository::memory::{epoch, MemoryStore};
    use crate::services::context::testing::FixedClock;
    use crate::services::context::{Caller, SchedulePolicy};

    fn record_job(
        store: &mut MemoryStore,
        remoteci_id: Uuid,
        topic_id: Uuid,
        rconfiguration_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) {
        store.jobs.push(Job {
            id: Uuid::new_v4(),
            remoteci_id,
            team_id: Uuid::new_v4(),
            topic_id,
            product_id: None,
            rconfiguration_id,
            previous_job_id: None,
            status: JobStatus::New,
            comment: None,
            duration: 0,
            etag: Uuid::new_v4(),
            state: ResourceState::Active,
            created_at,
            updated_at: created_at,
        });
    }

    #[tokio::test]
    async fn rotates_from_oldest_towards_newest_and_wraps() {
        let mut store = MemoryStore::default();
        let team = Uuid::new_v4();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let remoteci = store.add_remoteci(team);
        // Inserted oldest first so insertion order disagrees with rotation order.
        let cfg_c = store.add_rconfiguration(remoteci.id, topic.id, "cfgC", epoch() - Duration::hours(3), None);
        let cfg_b = store.add_rconfiguration(remoteci.id, topic.id, "cfgB", epoch() - Duration::hours(2), None);
        let cfg_a = store.add_rconfiguration(remoteci.id, topic.id, "cfgA", epoch() - Duration::hours(1), None);

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();

        let mut picked = Vec::new();
        for step in 0..4 {
            let selected = {
                let mut ctx = Context::new(&caller, &mut store, &clock, &policy);
                select_next(&mut ctx, topic.id, remoteci.id)
                    .await
                    .unwrap()
                    .unwrap()
            };
            picked.push(selected.id);
            record_job(
                &mut store,
                remoteci.id,
                topic.id,
                Some(selected.id),
                epoch() + Duration::minutes(step),
            );
        }

        assert_eq!(picked, vec![cfg_c.id, cfg_b.id, cfg_a.id, cfg_c.id]);
    }

    #[tokio::test]
    async fn every_configuration_is_used_equally_over_full_cycles() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let remoteci = store.add_remoteci(Uuid::new_v4());
        let ids: Vec<Uuid> = (0..4)
            .map(|n| {
                store
                    .add_rconfiguration(
                        remoteci.id,
                        topic.id,
                        &format!("cfg{n}"),
                        epoch() - Duration::hours(n),
                        None,
                    )
                    .id
            })
            .collect();

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();

        let mut counts = std::collections::HashMap::new();
        for step in 0..12 {
            let selected = {
                let mut ctx = Context::new(&caller, &mut store, &clock, &policy);
                select_next(&mut ctx, topic.id, remoteci.id)
                    .await
                    .unwrap()
                    .unwrap()
            };
            *counts.entry(selected.id).or_insert(0) += 1;
            record_job(
                &mut store,
                remoteci.id,
                topic.id,
                Some(selected.id),
                epoch() + Duration::minutes(step),
            );
        }

        for id in ids {
            assert_eq!(counts.get(&id), Some(&3));
        }
    }

    #[tokio::test]
    async fn no_configuration_means_none() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let remoteci = store.add_remoteci(Uuid::new_v4());

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        assert!(select_next(&mut ctx, topic.id, remoteci.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn vanished_last_used_restarts_at_newest() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let remoteci = store.add_remoteci(Uuid::new_v4());
        let newest = store.add_rconfiguration(remoteci.id, topic.id, "newest", epoch(), None);
        let gone = store.add_rconfiguration(
            remoteci.id,
            topic.id,
            "gone",
            epoch() - Duration::hours(1),
            None,
        );
        store.add_rconfiguration(remoteci.id, topic.id, "oldest", epoch() - Duration::hours(2), None);
        store.rconfigurations[1].state = ResourceState::Archived;
        record_job(&mut store, remoteci.id, topic.id, Some(gone.id), epoch());

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        let selected = select_next(&mut ctx, topic.id, remoteci.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(selected.id, newest.id);
    }

    #[tokio::test]
    async fn equal_timestamps_are_ordered_by_name() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let remoteci = store.add_remoteci(Uuid::new_v4());
        let beta = store.add_rconfiguration(remoteci.id, topic.id, "beta", epoch(), None);
        let alpha = store.add_rconfiguration(remoteci.id, topic.id, "alpha", epoch(), None);

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        // [alpha, beta]; starting from the last element.
        let first = select_next(&mut ctx, topic.id, remoteci.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, beta.id);
        assert_ne!(first.id, alpha.id);
    }

    #[test]
    fn next_index_wraps_at_the_front() {
        let make = |name: &str| RConfiguration {
            id: Uuid::new_v4(),
            topic_id: Uuid::nil(),
            name: name.to_string(),
            component_types: None,
            state: ResourceState::Active,
            created_at: epoch(),
            updated_at: epoch(),
        };
        let list = vec![make("a"), make("b"), make("c")];
        assert_eq!(next_index(&list, Some(list[0].id)), Some(2));
        assert_eq!(next_index(&list, Some(list[2].id)), Some(1));
        assert_eq!(next_index(&list, None), Some(2));
        assert_eq!(next_index(&list, Some(Uuid::new_v4())), Some(0));
        assert_eq!(next_index(&[], None), None);
    }
}
