// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory state store backend.
//!
//! Keys live in a sharded concurrent map; every operation locks its key's
//! slot for the duration of the call, which provides the single-key
//! atomicity the services rely on (one winner per popped queue element,
//! exact counter increments, compare-and-clear socket bindings). Expired
//! entries are dropped lazily on access and by the periodic sweeper.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::sync::broadcast;

use rendez_core::RendezError;

use crate::{StateStore, StoreOp, StoreReply, Subscription};

/// Broadcast buffer per pub/sub topic. Delivery is best-effort; a slow
/// subscriber past this depth loses the oldest payloads.
const TOPIC_BUFFER: usize = 64;

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Sorted(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    expires_at: Option<Instant>,
}

impl Stored {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Placeholder swapped in while a slot is being edited.
    fn tombstone() -> Self {
        Self {
            value: Value::Scalar(String::new()),
            expires_at: None,
        }
    }
}

fn wrong_type(key: &str) -> RendezError {
    RendezError::store(format!("wrong value type at key `{key}`"))
}

/// Process-embedded [`StateStore`] backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Stored>,
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key` and hand its live slot to `f`. An expired entry reads as
    /// absent. `f` leaving `None` in the slot deletes the entry. The entry
    /// guard is held for the whole call, so the closure runs atomically
    /// with respect to every other operation on the same key.
    fn with_slot<R>(&self, key: &str, f: impl FnOnce(&mut Option<Stored>) -> R) -> R {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occ) => {
                let stored = std::mem::replace(occ.get_mut(), Stored::tombstone());
                let mut slot = if stored.is_expired() { None } else { Some(stored) };
                let result = f(&mut slot);
                match slot {
                    Some(stored) => *occ.get_mut() = stored,
                    None => {
                        occ.remove();
                    }
                }
                result
            }
            MapEntry::Vacant(vac) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(stored) = slot {
                    vac.insert(stored);
                }
                result
            }
        }
    }

    fn apply_op(key: &str, slot: &mut Option<Stored>, op: &StoreOp) -> Result<StoreReply, RendezError> {
        match op {
            StoreOp::SortedAdd { score, member } => {
                let stored = slot.get_or_insert_with(|| Stored::new(Value::Sorted(Vec::new()), None));
                let Value::Sorted(members) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                match members.iter_mut().find(|(_, m)| m == member) {
                    Some(existing) => existing.0 = *score,
                    None => members.push((*score, member.clone())),
                }
                Ok(StoreReply::Unit)
            }
            StoreOp::SortedRemoveRange { min, max } => match slot {
                Some(stored) => {
                    let Value::Sorted(members) = &mut stored.value else {
                        return Err(wrong_type(key));
                    };
                    let before = members.len();
                    members.retain(|(score, _)| !(*min <= *score && *score <= *max));
                    let removed = (before - members.len()) as u64;
                    if members.is_empty() {
                        *slot = None;
                    }
                    Ok(StoreReply::Count(removed))
                }
                None => Ok(StoreReply::Count(0)),
            },
            StoreOp::SortedCount => match slot {
                Some(stored) => {
                    let Value::Sorted(members) = &stored.value else {
                        return Err(wrong_type(key));
                    };
                    Ok(StoreReply::Count(members.len() as u64))
                }
                None => Ok(StoreReply::Count(0)),
            },
            StoreOp::Expire { ttl } => {
                if let Some(stored) = slot {
                    stored.expires_at = Some(Instant::now() + *ttl);
                }
                Ok(StoreReply::Unit)
            }
        }
    }
}

/// Translate a `start..=stop` range with negative tail-relative indices
/// into concrete bounds over a list of length `len`.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    start = start.max(0);
    stop = stop.min(len - 1);
    if start > stop || len == 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(Stored {
                value: Value::Scalar(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        })
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), RendezError> {
        self.with_slot(key, |slot| {
            *slot = Some(Stored::new(Value::Scalar(value.to_string()), ttl));
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, RendezError> {
        self.with_slot(key, |slot| Ok(slot.take().is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                stored.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::Scalar(s) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                let current: i64 = s
                    .parse()
                    .map_err(|_| RendezError::store(format!("non-numeric counter at `{key}`")))?;
                let next = current + delta;
                *s = next.to_string();
                Ok(next)
            }
            None => {
                *slot = Some(Stored::new(Value::Scalar(delta.to_string()), ttl));
                Ok(delta)
            }
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(Stored {
                value: Value::Hash(h),
                ..
            }) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        })
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), RendezError> {
        self.with_slot(key, |slot| {
            let stored = slot.get_or_insert_with(|| Stored::new(Value::Hash(HashMap::new()), None));
            let Value::Hash(h) = &mut stored.value else {
                return Err(wrong_type(key));
            };
            for (field, value) in fields {
                h.insert((*field).to_string(), (*value).to_string());
            }
            Ok(())
        })
    }

    async fn hash_del(&self, key: &str, fields: &[&str]) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::Hash(h) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                let removed = fields.iter().filter(|f| h.remove(**f).is_some()).count() as u64;
                if h.is_empty() {
                    *slot = None;
                }
                Ok(removed)
            }
            None => Ok(0),
        })
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(Stored {
                value: Value::Hash(h),
                ..
            }) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        })
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, RendezError> {
        self.with_slot(key, |slot| {
            let stored = slot.get_or_insert_with(|| Stored::new(Value::Hash(HashMap::new()), None));
            let Value::Hash(h) = &mut stored.value else {
                return Err(wrong_type(key));
            };
            let entry = h.entry(field.to_string()).or_insert_with(|| "0".to_string());
            let current: i64 = entry.parse().map_err(|_| {
                RendezError::store(format!("non-numeric hash field `{field}` at `{key}`"))
            })?;
            let next = current + delta;
            *entry = next.to_string();
            Ok(next)
        })
    }

    async fn hash_compare_delete(
        &self,
        key: &str,
        field: &str,
        expected: &str,
    ) -> Result<bool, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::Hash(h) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                if h.get(field).is_some_and(|v| v == expected) {
                    h.remove(field);
                    if h.is_empty() {
                        *slot = None;
                    }
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => Ok(false),
        })
    }

    async fn push_back(&self, key: &str, value: &str) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| {
            let stored =
                slot.get_or_insert_with(|| Stored::new(Value::List(VecDeque::new()), None));
            let Value::List(list) = &mut stored.value else {
                return Err(wrong_type(key));
            };
            list.push_back(value.to_string());
            Ok(list.len() as u64)
        })
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| {
            let stored =
                slot.get_or_insert_with(|| Stored::new(Value::List(VecDeque::new()), None));
            let Value::List(list) = &mut stored.value else {
                return Err(wrong_type(key));
            };
            list.push_front(value.to_string());
            Ok(list.len() as u64)
        })
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::List(list) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                let head = list.pop_front();
                if list.is_empty() {
                    *slot = None;
                }
                Ok(head)
            }
            None => Ok(None),
        })
    }

    async fn remove_value(&self, key: &str, value: &str) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::List(list) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                let before = list.len();
                list.retain(|v| v != value);
                let removed = (before - list.len()) as u64;
                if list.is_empty() {
                    *slot = None;
                }
                Ok(removed)
            }
            None => Ok(0),
        })
    }

    async fn list_len(&self, key: &str) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(Stored {
                value: Value::List(list),
                ..
            }) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        })
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(Stored {
                value: Value::List(list),
                ..
            }) => match resolve_range(list.len(), start, stop) {
                Some((start, stop)) => Ok(list.range(start..=stop).cloned().collect()),
                None => Ok(Vec::new()),
            },
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        })
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::List(list) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                match resolve_range(list.len(), start, stop) {
                    Some((start, stop)) => {
                        *list = list.range(start..=stop).cloned().collect();
                    }
                    None => *slot = None,
                }
                Ok(())
            }
            None => Ok(()),
        })
    }

    async fn sorted_add(&self, key: &str, score: f64, member: &str) -> Result<(), RendezError> {
        self.with_slot(key, |slot| {
            Self::apply_op(
                key,
                slot,
                &StoreOp::SortedAdd {
                    score,
                    member: member.to_string(),
                },
            )
            .map(|_| ())
        })
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool, RendezError> {
        self.with_slot(key, |slot| match slot {
            Some(stored) => {
                let Value::Sorted(members) = &mut stored.value else {
                    return Err(wrong_type(key));
                };
                let before = members.len();
                members.retain(|(_, m)| m != member);
                let removed = members.len() < before;
                if members.is_empty() {
                    *slot = None;
                }
                Ok(removed)
            }
            None => Ok(false),
        })
    }

    async fn sorted_remove_range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| {
            Self::apply_op(key, slot, &StoreOp::SortedRemoveRange { min, max })
                .map(|reply| reply.count())
        })
    }

    async fn sorted_count(&self, key: &str) -> Result<u64, RendezError> {
        self.with_slot(key, |slot| {
            Self::apply_op(key, slot, &StoreOp::SortedCount).map(|reply| reply.count())
        })
    }

    async fn pipeline(
        &self,
        key: &str,
        ops: Vec<StoreOp>,
    ) -> Result<Vec<StoreReply>, RendezError> {
        self.with_slot(key, |slot| {
            let mut replies = Vec::with_capacity(ops.len());
            for op in &ops {
                replies.push(Self::apply_op(key, slot, op)?);
            }
            Ok(replies)
        })
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, RendezError> {
        let Some(tx) = self.topics.get(topic) else {
            return Ok(0);
        };
        match tx.send(payload.to_string()) {
            Ok(delivered) => Ok(delivered as u64),
            Err(_) => {
                // Last subscriber is gone; drop the idle topic.
                drop(tx);
                self.topics
                    .remove_if(topic, |_, tx| tx.receiver_count() == 0);
                Ok(0)
            }
        }
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        let rx = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .subscribe();
        Subscription::new(rx, topic.to_string())
    }

    async fn sweep(&self) -> Result<u64, RendezError> {
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired());
        Ok((before - self.entries.len()) as u64)
    }
}
