//! Component-set resolution: exactly one component per requested type.

use std::collections::HashSet;

use uuid::Uuid;

use super::catalog;
use super::context::Context;
use crate::error::{SchedulerError, SchedulerResult};
use crate::repository::Store;

/// Latest active component for every type, failing fast on the first
/// type with no candidate.
pub async fn resolve_by_type<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    types: &[String],
) -> SchedulerResult<Vec<Uuid>> {
    let mut resolved = Vec::with_capacity(types.len());
    for component_type in types {
        let component = catalog::latest_active_component(ctx, topic_id, component_type).await?;
        if resolved.contains(&component.id) {
            return Err(SchedulerError::DuplicateType(component_type.clone()));
        }
        resolved.push(component.id);
    }
    Ok(resolved)
}

/// Validate caller-chosen ids. The count must match the type list, and no
/// two of the components may share a type. Order of `ids` is kept.
pub async fn resolve_by_explicit_ids<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    ids: &[Uuid],
    types: &[String],
) -> SchedulerResult<Vec<Uuid>> {
    if ids.len() != types.len() {
        return Err(SchedulerError::CountMismatch {
            ids: ids.len(),
            types: types.to_vec(),
        });
    }

    let components = catalog::validate_component_ids(ctx, topic_id, ids).await?;

    let mut seen = HashSet::with_capacity(components.len());
    for component in &components {
        if !seen.insert(component.type_.as_str()) {
            return Err(SchedulerError::DuplicateType(component.type_.clone()));
        }
    }
    Ok(ids.to_vec())
}

/// Single entry point used by job creation.
pub async fn resolve<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
    types: &[String],
    explicit_ids: &[Uuid],
) -> SchedulerResult<Vec<Uuid>> {
    if explicit_ids.is_empty() {
        resolve_by_type(ctx, topic_id, types).await
    } else {
        resolve_by_explicit_ids(ctx, topic_id, explicit_ids, types).await
    }
}
