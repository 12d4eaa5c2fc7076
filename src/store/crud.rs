//! Generic CRUD helpers.

use super::query::{self, ListQuery, Paginated};
use super::{Entity, HasStatus, Store};
use crate::error::ApiError;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Fetches a single record.
///
/// # Errors
/// Returns `NotFound` if the id is unknown.
pub fn get_record<E: Entity>(store: &Store, id: Uuid) -> Result<E, ApiError> {
    E::table(store)
        .get(&id)
        .ok_or_else(|| ApiError::not_found(E::NAME, id))
}

/// Lists records with filtering, sorting and pagination.
///
/// # Errors
/// Returns `InvalidRequest` on a malformed filter.
pub fn get_filtered<E: Entity>(store: &Store, query: &ListQuery) -> Result<Paginated<E>, ApiError> {
    query::apply(E::table(store).values(), query)
}

/// Validates and inserts a new record, applying its planned side effects.
///
/// # Errors
/// Returns the validation error of the entity; nothing is written on error.
pub fn store_record<E: Entity>(store: &Store, req: E::Create) -> Result<E, ApiError> {
    let mut record = E::from_create(Uuid::new_v4(), req, Utc::now())?;

    let _guard = store.lock();
    let effects = record.plan_create(store)?;
    store.apply(effects);
    E::table(store).insert(record.id(), record.clone());

    info!("Created {} {}", E::NAME, record.id());
    Ok(record)
}

/// Applies an update payload to an existing record.
///
/// # Errors
/// Returns `NotFound` for an unknown id or the entity's validation error.
pub fn update_record<E: Entity>(store: &Store, id: Uuid, req: E::Update) -> Result<E, ApiError> {
    let _guard = store.lock();
    let mut record = get_record::<E>(store, id)?;
    record.apply_update(req, Utc::now())?;
    record.validate_update(store)?;
    E::table(store).insert(id, record.clone());

    debug!("Updated {} {}", E::NAME, id);
    Ok(record)
}

/// Sets the status of every listed record.
///
/// Every id must exist; otherwise nothing changes.
///
/// # Errors
/// Returns `NotFound` for the first unknown id, `InvalidRequest` for an
/// empty id list.
pub fn update_status<E: HasStatus>(
    store: &Store,
    ids: &[Uuid],
    status: E::Status,
) -> Result<Vec<E>, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::InvalidRequest("ids cannot be empty".to_string()));
    }

    let _guard = store.lock();
    let table = E::table(store);
    for id in ids {
        if !table.contains(id) {
            return Err(ApiError::not_found(E::NAME, id));
        }
    }

    let now = Utc::now();
    let updated: Vec<E> = ids
        .iter()
        .filter_map(|id| table.update(id, |record| record.set_status(status, now)))
        .collect();

    info!(
        "Updated status of {} {} record(s) to {:?}",
        updated.len(),
        E::NAME,
        status
    );
    Ok(updated)
}

/// Deletes a single record after running its compensating actions.
///
/// # Errors
/// Returns `NotFound` for an unknown id or the compensation error.
pub fn handle_single_delete<E: Entity>(store: &Store, id: Uuid) -> Result<E, ApiError> {
    let mut deleted = handle_bulk_delete::<E>(store, &[id])?;
    deleted
        .pop()
        .ok_or_else(|| ApiError::Internal(format!("{} {} vanished during delete", E::NAME, id)))
}

/// Deletes several records atomically.
///
/// All compensations are planned before anything is applied, so one failing
/// id leaves every record and wallet untouched.
///
/// # Errors
/// Returns `NotFound` for an unknown id or the first compensation error.
pub fn handle_bulk_delete<E: Entity>(store: &Store, ids: &[Uuid]) -> Result<Vec<E>, ApiError> {
    handle_bulk_delete_with::<E, _>(store, ids, |_| Ok(()))
}

/// Like [`handle_bulk_delete`], with `check` run on the located records
/// under the store guard before anything is applied.
///
/// # Errors
/// Returns `NotFound` for an unknown id, the error of `check` or the first
/// compensation error.
pub fn handle_bulk_delete_with<E, F>(store: &Store, ids: &[Uuid], check: F) -> Result<Vec<E>, ApiError>
where
    E: Entity,
    F: FnOnce(&[E]) -> Result<(), ApiError>,
{
    if ids.is_empty() {
        return Err(ApiError::InvalidRequest("ids cannot be empty".to_string()));
    }

    let mut seen = HashSet::new();
    let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

    let _guard = store.lock();
    let table = E::table(store);

    let records = unique
        .iter()
        .map(|id| table.get(id).ok_or_else(|| ApiError::not_found(E::NAME, id)))
        .collect::<Result<Vec<E>, ApiError>>()?;
    check(&records)?;

    let mut effects = Vec::new();
    for record in &records {
        effects.extend(record.plan_delete(store)?);
    }

    store.apply(effects);
    for record in &records {
        table.remove(&record.id());
    }

    info!("Deleted {} {} record(s)", records.len(), E::NAME);
    Ok(records)
}
