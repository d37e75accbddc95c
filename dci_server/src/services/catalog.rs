//! Read-only component catalog queries.

use uuid::Uuid;

use super::context::Context;
use crate::error::{ComponentLookup, SchedulerError, SchedulerResult};
use crate::models::component::Component;
use crate::repository::Store;

/// Newest active, globally visible component of `component_type` in the topic.
///
/// A missing type blocks scheduling; it is never skipped.
pub async fn latest_active_component<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    component_type: &str,
) -> SchedulerResult<Component> {
    let export_control_required = ctx.policy.require_export_control;
    ctx.store
        .latest_active_component(topic_id, component_type, export_control_required)
        .await?
        .ok_or_else(|| {
            SchedulerError::ComponentNotFound(ComponentLookup::Type(component_type.to_string()))
        })
}

/// Load each id, checking it belongs to the topic, is active and exported
/// when required.
///
/// A team-owned component the caller's team cannot see is `Unauthorized`
/// rather than missing.
pub async fn validate_component_ids<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    ids: &[Uuid],
) -> SchedulerResult<Vec<Component>> {
    let mut components = Vec::with_capacity(ids.len());
    for id in ids {
        let component = ctx
            .store
            .get_component(*id)
            .await?
            .filter(|c| c.topic_id == topic_id && c.is_active())
            .filter(|c| c.export_control || !ctx.policy.require_export_control)
            .ok_or(SchedulerError::ComponentNotFound(ComponentLookup::Id(*id)))?;
        if let Some(owner) = component.team_id {
            if !ctx.caller.belongs_to(owner) {
                tracing::debug!(
                    component_id = %id,
                    team_id = %owner,
                    "Component owned by another team"
                );
                return Err(SchedulerError::Unauthorized);
            }
        }
        components.push(component);
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::ResourceState;
    use crate::repository::memory::{epoch, MemoryStore};
    use crate::services::context::testing::FixedClock;
    use crate::services::context::{Caller, SchedulePolicy};

    #[tokio::test]
    async fn latest_ignores_inactive_and_team_owned_components() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let visible = store.add_component(topic.id, "puddle", Duration::hours(5));
        store.add_component(topic.id, "puddle", Duration::hours(1));
        store.components[1].state = ResourceState::Archived;
        store.add_component(topic.id, "puddle", Duration::hours(2));
        store.components[2].team_id = Some(Uuid::new_v4());

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        let latest = latest_active_component(&mut ctx, topic.id, "puddle")
            .await
            .unwrap();
        assert_eq!(latest.id, visible.id);
    }

    #[tokio::test]
    async fn unexported_components_are_hidden_when_export_is_required() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let component = store.add_component(topic.id, "puddle", Duration::hours(1));
        store.components[0].export_control = false;

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let strict = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &strict);
        let err = validate_component_ids(&mut ctx, topic.id, &[component.id])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::ComponentNotFound(ComponentLookup::Id(id)) if id == component.id
        ));

        let relaxed = SchedulePolicy {
            require_export_control: false,
            ..SchedulePolicy::default()
        };
        let mut ctx = Context::new(&caller, &mut store, &clock, &relaxed);
        let found = validate_component_ids(&mut ctx, topic.id, &[component.id])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn component_owned_by_another_team_is_unauthorized() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let team = Uuid::new_v4();
        let private = store.add_component(topic.id, "puddle", Duration::hours(1));
        store.components[0].team_id = Some(Uuid::new_v4());
        let own = store.add_component(topic.id, "puddle", Duration::hours(2));
        store.components[1].team_id = Some(team);

        let caller = Caller::member_of(team);
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        let err = validate_component_ids(&mut ctx, topic.id, &[private.id])
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unauthorized));

        let found = validate_component_ids(&mut ctx, topic.id, &[own.id])
            .await
            .unwrap();
        assert_eq!(found[0].id, own.id);
    }

    #[tokio::test]
    async fn component_from_another_topic_is_not_found() {
        let mut store = MemoryStore::default();
        let topic = store.add_topic("RHEL-8.1", &["puddle"]);
        let other = store.add_topic("RHEL-9.0", &["puddle"]);
        let foreign = store.add_component(other.id, "puddle", Duration::hours(1));

        let caller = Caller::super_admin();
        let clock = FixedClock::at(epoch());
        let policy = SchedulePolicy::default();
        let mut ctx = Context::new(&caller, &mut store, &clock, &policy);

        let err = validate_component_ids(&mut ctx, topic.id, &[foreign.id])
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ComponentNotFound(_)));
    }
}
