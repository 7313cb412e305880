//! Condition discovery
//!
//! Finds every condition referenced anywhere in a configuration tree:
//! overrides, automations, and arbitrarily nested UI elements all carry their
//! conditions under a `conditions` key.

use serde_json::Value;
use tracing::{debug, trace};

use crate::condition::Condition;

/// Collect every condition list found in `config`, by recursive descent
///
/// Items of a `conditions` array that parse as a [`Condition`] are collected
/// (compound conditions carry their children with them). Items that do not
/// parse are descended into like any other value.
pub fn collect_conditions(config: &Value) -> Vec<Condition> {
    let mut found = Vec::new();
    visit(config, &mut found);
    trace!(count = found.len(), "Discovered conditions");
    found
}

fn visit(value: &Value, found: &mut Vec<Condition>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("conditions", Value::Array(items)) => {
                        for item in items {
                            match serde_json::from_value::<Condition>(item.clone()) {
                                Ok(condition) => found.push(condition),
                                Err(e) => {
                                    debug!(error = %e, "Skipping unparseable condition");
                                    visit(item, found);
                                }
                            }
                        }
                    }
                    _ => visit(child, found),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                visit(item, found);
            }
        }
        _ => {}
    }
}
