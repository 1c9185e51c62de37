//! In-process fake Redis backend, selected by `USE_FAKE_REDIS`. Used in tests and
//! local development so callers exercise the same `Conn` surface without a live
//! server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

#[derive(Default)]
struct StreamState {
    entries: Vec<(String, String)>,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    next_index: usize,
    pending: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    sorted_sets: HashMap<String, Vec<(String, f64)>>,
    streams: HashMap<String, StreamState>,
    next_stream_id: u64,
}

/// Cheaply cloneable handle to the shared fake backend state.
#[derive(Clone)]
pub struct FakeConn {
    state: Arc<Mutex<State>>,
}

impl FakeConn {
    #[must_use]
    pub fn new() -> Self {
        FakeConn {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().strings.get(key).cloned()
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    pub(crate) fn append_json_array(&self, key: &str, field: &str, item: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let doc = state
            .strings
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let mut obj: serde_json::Value = serde_json::from_str(doc)?;
        let item_value: serde_json::Value = serde_json::from_str(item)?;
        let arr = obj
            .as_object_mut()
            .and_then(|o| o.get_mut(field))
            .and_then(|v| v.as_array_mut());
        match arr {
            Some(arr) => arr.push(item_value),
            None => {
                if let Some(o) = obj.as_object_mut() {
                    o.insert(field.to_string(), serde_json::Value::Array(vec![item_value]));
                }
            }
        }
        state.strings.insert(key.to_string(), obj.to_string());
        Ok(())
    }

    pub(crate) fn zadd(&self, key: &str, score: f64, member: &str) {
        let mut state = self.state.lock().unwrap();
        let set = state.sorted_sets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != member);
        set.push((member.to_string(), score));
    }

    pub(crate) fn zpop_ready(&self, key: &str, max_score: f64) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Vec::new();
        };
        let mut ready: Vec<(String, f64)> = Vec::new();
        set.retain(|(member, score)| {
            if *score <= max_score {
                ready.push((member.clone(), *score));
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        ready.into_iter().map(|(m, _)| m).collect()
    }

    pub(crate) fn xadd(&self, stream: &str, payload: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_stream_id += 1;
        let id = format!("{}-0", state.next_stream_id);
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .entries
            .push((id.clone(), payload.to_string()));
        id
    }

    pub(crate) fn ensure_group(&self, stream: &str, group: &str) {
        let mut state = self.state.lock().unwrap();
        let stream_state = state.streams.entry(stream.to_string()).or_default();
        stream_state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                next_index: stream_state.entries.len(),
                pending: HashMap::new(),
            });
    }

    pub(crate) fn xreadgroup(&self, stream: &str, group: &str, count: usize) -> Vec<(String, String)> {
        let mut state = self.state.lock().unwrap();
        let Some(stream_state) = state.streams.get_mut(stream) else {
            return Vec::new();
        };
        let entries = stream_state.entries.clone();
        let Some(group_state) = stream_state.groups.get_mut(group) else {
            return Vec::new();
        };
        let start = group_state.next_index;
        let end = (start + count).min(entries.len());
        let batch: Vec<(String, String)> = entries[start..end].to_vec();
        group_state.next_index = end;
        for (id, payload) in &batch {
            group_state.pending.insert(id.clone(), payload.clone());
        }
        batch
    }

    pub(crate) fn xack(&self, stream: &str, group: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(stream_state) = state.streams.get_mut(stream) {
            if let Some(group_state) = stream_state.groups.get_mut(group) {
                group_state.pending.remove(id);
            }
        }
    }
}

impl Default for FakeConn {
    fn default() -> Self {
        FakeConn::new()
    }
}
