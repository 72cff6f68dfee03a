//! Diff engine
//!
//! Compares the desired state with the applied records and produces a
//! [`ChangeSet`]. Pure: nothing here talks to a provider or a store.

use crate::action::{ActionType, AttrChange, ChangeSet, Operation};
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::state::AppliedState;
use infraflow_core::{AttrValue, DesiredState, ResourceSpec, ValidationError};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the operations that take `applied` to `desired`
///
/// Deletes come first, dependents before their dependencies. Creates,
/// updates and no-ops follow in dependency order. Deletes of resources that
/// a surviving resource still uses come last and wait on that resource.
pub fn diff(desired: &DesiredState, applied: &[AppliedState]) -> Result<ChangeSet> {
    let desired_graph = DependencyGraph::from_specs(&desired.resources)?;
    let desired_order = desired_graph.topological_order()?;

    let applied_by_name: BTreeMap<&str, &AppliedState> =
        applied.iter().map(|a| (a.name.as_str(), a)).collect();

    for spec in &desired.resources {
        if let Some(current) = applied_by_name.get(spec.name.as_str())
            && current.kind != spec.kind
        {
            return Err(ValidationError::resource(
                &spec.name,
                format!(
                    "kind changed from '{}' to '{}'; use a new name instead",
                    current.kind, spec.kind
                ),
            )
            .into());
        }
    }

    let orphan_names: BTreeSet<&str> = applied
        .iter()
        .filter(|a| desired.get(&a.name).is_none())
        .map(|a| a.name.as_str())
        .collect();

    let applied_graph = DependencyGraph::from_applied(applied);
    let delete_order = applied_graph.reverse_order()?;

    // An orphan still used by a surviving resource can only go once that
    // resource has been updated to stop using it
    let deferred: BTreeSet<&str> = orphan_names
        .iter()
        .copied()
        .filter(|name| {
            applied_graph
                .transitive_dependents(name)
                .iter()
                .any(|dependent| desired.get(dependent).is_some())
        })
        .collect();

    let mut deletes = Vec::new();
    let mut deferred_deletes = Vec::new();
    for name in delete_order {
        let Some(current) = applied_by_name.get(name.as_str()) else {
            continue;
        };
        if !orphan_names.contains(name.as_str()) {
            continue;
        }
        // Orphaned dependents are deleted first, surviving ones updated first
        let waits_on = applied_graph.dependents_of(&name);
        let operation = Operation {
            name: name.clone(),
            kind: current.kind,
            action: ActionType::Delete,
            desired: None,
            current: Some((*current).clone()),
            waits_on,
            changes: Vec::new(),
        };
        if deferred.contains(name.as_str()) {
            deferred_deletes.push(operation);
        } else {
            deletes.push(operation);
        }
    }

    let mut operations = Vec::with_capacity(desired.len() + orphan_names.len());
    operations.append(&mut deletes);

    for name in desired_order {
        let Some(spec) = desired.get(&name) else {
            continue;
        };
        let current = applied_by_name.get(name.as_str()).copied();

        let mut waits_on = spec.dependencies();
        // Orphans that still use this resource go away first
        waits_on.extend(
            applied_graph
                .dependents_of(&name)
                .into_iter()
                .filter(|dependent| {
                    orphan_names.contains(dependent.as_str())
                        && !deferred.contains(dependent.as_str())
                }),
        );

        let (action, changes) = match current {
            None => (ActionType::Create, Vec::new()),
            Some(current) => {
                let changes = attribute_changes(spec, current);
                if changes.is_empty() {
                    (ActionType::NoOp, changes)
                } else {
                    (ActionType::Update, changes)
                }
            }
        };

        operations.push(Operation {
            name: name.clone(),
            kind: spec.kind,
            action,
            desired: Some(spec.clone()),
            current: current.cloned(),
            waits_on,
            changes,
        });
    }

    operations.append(&mut deferred_deletes);

    tracing::debug!(operations = operations.len(), "Computed change set");
    Ok(ChangeSet::new(operations))
}

/// Change set that removes every applied record
pub fn destroy_all(applied: &[AppliedState]) -> Result<ChangeSet> {
    diff(&DesiredState::default(), applied)
}

/// Per-attribute differences between the normalized desired attributes and
/// the applied ones. Provider outputs are not compared.
pub fn attribute_changes(spec: &ResourceSpec, current: &AppliedState) -> Vec<AttrChange> {
    compare_attributes(&current.attributes, &spec.normalized())
}

pub(crate) fn compare_attributes(
    before: &BTreeMap<String, AttrValue>,
    after: &BTreeMap<String, AttrValue>,
) -> Vec<AttrChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            (old != new).then(|| AttrChange {
                attribute: key.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}
