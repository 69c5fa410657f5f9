use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_collection, get_required_str, store_mut, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::Collection;
use crate::store::Snapshot;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let collection = get_collection(&req.params)?;
    let records = store_ref(state)?.list_all(collection)?;
    Ok(json!({ "collection": collection, "records": records }))
}

/// PIs and Sponsors may only be deleted while no proposal points at them.
fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let collection = get_collection(&req.params)?;
    let id = get_required_str(&req.params, "id")?;
    let store = store_mut(state)?;

    let ref_field = match collection {
        Collection::Pis => Some("pi_id"),
        Collection::Sponsors => Some("sponsor_id"),
        Collection::Files => None,
    };
    if let Some(field) = ref_field {
        match store.find_first(Collection::Files, field, &id) {
            Ok(file) => {
                return Err(HandlerErr::new(
                    "in_use",
                    format!("{} {} is referenced by a proposal", collection.label(), id),
                )
                .with_details(json!({ "dbNo": file.str_field("db_no"), "fileId": file.id })));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    store.delete(collection, &id)?;
    tracing::info!(collection = %collection, id = %id, "record deleted");
    Ok(json!({ "deleted": true }))
}

fn handle_snapshot_export(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let out = PathBuf::from(get_required_str(&req.params, "outPath")?);
    let snapshot = Snapshot::collect(store_ref(state)?)?;
    snapshot.save(&out)?;
    Ok(json!({ "outPath": out, "counts": snapshot.counts() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "records.list" => handle_list(state, req),
        "records.delete" => handle_delete(state, req),
        "snapshot.export" => handle_snapshot_export(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
