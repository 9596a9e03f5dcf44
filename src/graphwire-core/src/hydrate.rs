//! Hydration of raw JSON result payloads into typed graph entities.
//!
//! The server describes entities in its REST shape: an object with a
//! `metadata` block (integer `id`, `labels`), a `data` property map and a
//! `self` URL; relationships add a `type` string and `start`/`end`
//! endpoints; paths carry inline `nodes` and `relationships` arrays in
//! traversal order. Anything else passes through as a scalar or
//! collection, recursively hydrated. Pure functions, no network.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::entity::{Node, Path, PropertyMap, Relationship};
use crate::error::{GraphError, Result};
use crate::record::Record;
use crate::value::Value;

/// Hydrate one result value.
pub fn hydrate(raw: &Json) -> Result<Value> {
    match raw {
        Json::Object(_) => {
            if looks_like_path(raw) {
                hydrate_path(raw).map(Value::Path)
            } else if looks_like_relationship(raw) {
                hydrate_relationship(raw).map(Value::Relationship)
            } else if looks_like_node(raw) {
                hydrate_node(raw).map(Value::Node)
            } else {
                let map = raw
                    .as_object()
                    .into_iter()
                    .flatten()
                    .map(|(k, v)| Ok((k.clone(), hydrate(v)?)))
                    .collect::<Result<_>>()?;
                Ok(Value::Map(map))
            }
        }
        Json::Array(items) => {
            let list = items.iter().map(hydrate).collect::<Result<Vec<_>>>()?;
            Ok(Value::List(list))
        }
        scalar => Ok(Value::from_json(scalar)),
    }
}

/// Hydrate one result row into a record.
pub fn hydrate_row(keys: Arc<Vec<String>>, row: &[Json]) -> Result<Record> {
    if row.len() != keys.len() {
        return Err(GraphError::Protocol {
            status: None,
            message: format!("row has {} values for {} columns", row.len(), keys.len()),
        });
    }
    let values = row.iter().map(hydrate).collect::<Result<Vec<_>>>()?;
    Ok(Record::new(keys, values))
}

fn looks_like_node(raw: &Json) -> bool {
    raw.get("data").map_or(false, Json::is_object)
        && raw
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .map_or(false, Json::is_array)
        && raw.get("type").is_none()
}

fn looks_like_relationship(raw: &Json) -> bool {
    raw.get("data").map_or(false, Json::is_object)
        && raw.get("type").map_or(false, Json::is_string)
        && raw.get("start").is_some()
        && raw.get("end").is_some()
}

fn looks_like_path(raw: &Json) -> bool {
    raw.get("nodes").map_or(false, Json::is_array)
        && raw.get("relationships").map_or(false, Json::is_array)
        && raw.get("length").is_some()
}

pub fn hydrate_node(raw: &Json) -> Result<Node> {
    let id = entity_id(raw)?;
    let labels = raw
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Json::as_array)
        .map(|labels| {
            labels
                .iter()
                .map(|l| {
                    l.as_str().map(str::to_owned).ok_or_else(|| GraphError::Protocol {
                        status: None,
                        message: "node label is not a string".to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();
    Ok(Node::new(id, labels, hydrate_properties(raw)?))
}

pub fn hydrate_relationship(raw: &Json) -> Result<Relationship> {
    let id = entity_id(raw)?;
    let rel_type = raw
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("relationship has no type"))?;
    let start = endpoint_id(raw, "start")?;
    let end = endpoint_id(raw, "end")?;
    Ok(Relationship::new(
        id,
        start,
        end,
        rel_type,
        hydrate_properties(raw)?,
    ))
}

pub fn hydrate_path(raw: &Json) -> Result<Path> {
    let nodes = raw
        .get("nodes")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("path has no nodes"))?
        .iter()
        .map(hydrate_node)
        .collect::<Result<Vec<_>>>()?;
    let relationships = raw
        .get("relationships")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("path has no relationships"))?
        .iter()
        .map(hydrate_relationship)
        .collect::<Result<Vec<_>>>()?;
    Path::new(nodes, relationships)
}

fn hydrate_properties(raw: &Json) -> Result<PropertyMap> {
    raw.get("data")
        .and_then(Json::as_object)
        .into_iter()
        .flatten()
        .map(|(k, v)| Ok((k.clone(), hydrate(v)?)))
        .collect()
}

/// Identity comes verbatim from `metadata.id`, falling back to the trailing
/// segment of the `self` URL. Never recomputed.
fn entity_id(raw: &Json) -> Result<i64> {
    if let Some(id) = raw.get("metadata").and_then(|m| m.get("id")) {
        return id
            .as_i64()
            .ok_or_else(|| malformed("entity id is not an integer"));
    }
    raw.get("self")
        .and_then(Json::as_str)
        .and_then(url_tail_id)
        .ok_or_else(|| malformed("entity has no usable identity"))
}

/// Start/end endpoints arrive as either a bare integer id or an entity URL.
fn endpoint_id(raw: &Json, key: &str) -> Result<i64> {
    let endpoint = raw
        .get(key)
        .ok_or_else(|| malformed("relationship endpoint missing"))?;
    if let Some(id) = endpoint.as_i64() {
        return Ok(id);
    }
    endpoint
        .as_str()
        .and_then(url_tail_id)
        .ok_or_else(|| malformed("relationship endpoint is not an id or entity URL"))
}

fn url_tail_id(url: &str) -> Option<i64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

fn malformed(message: &str) -> GraphError {
    GraphError::Protocol {
        status: None,
        message: message.to_string(),
    }
}
