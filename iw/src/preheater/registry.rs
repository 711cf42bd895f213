//! Reference-counted registry of preheating requests
//!
//! Plain data structure; the preheater serializes access with one lock.

use std::collections::HashMap;

use crate::queue::WorkTicket;
use crate::request::RequestKey;

/// One outstanding speculative load
#[derive(Debug, Clone)]
pub struct PreheatTask {
    pub key: RequestKey,
    pub refcount: usize,
    /// Insertion order, also used to tell generations of the same key apart
    pub seq: u64,
    pub ticket: WorkTicket,
}

/// Outcome of dropping one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// No entry for the key
    Absent,
    /// Entry still referenced, with the remaining count
    Retained(usize),
    /// Count reached zero; the caller must cancel and then remove
    Exhausted,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<RequestKey, PreheatTask>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &RequestKey) -> Option<&PreheatTask> {
        self.entries.get(key)
    }

    /// Sequence number the next [`Registry::insert`] will assign
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Add a reference to an existing entry; returns the new count
    pub fn retain(&mut self, key: &RequestKey) -> Option<usize> {
        self.entries.get_mut(key).map(|task| {
            task.refcount += 1;
            task.refcount
        })
    }

    /// Register a new entry with one reference; returns its sequence number
    pub fn insert(&mut self, key: RequestKey, ticket: WorkTicket) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key.clone(),
            PreheatTask {
                key,
                refcount: 1,
                seq,
                ticket,
            },
        );
        seq
    }

    /// Drop one reference; an exhausted entry stays until [`Registry::remove`]
    pub fn release(&mut self, key: &RequestKey) -> Release {
        match self.entries.get_mut(key) {
            None => Release::Absent,
            Some(task) if task.refcount > 1 => {
                task.refcount -= 1;
                Release::Retained(task.refcount)
            }
            Some(task) => {
                task.refcount = 0;
                Release::Exhausted
            }
        }
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<PreheatTask> {
        self.entries.remove(key)
    }

    /// Remove the entry only if it is still the generation `seq`
    pub fn remove_generation(&mut self, key: &RequestKey, seq: u64) -> Option<PreheatTask> {
        match self.entries.get(key) {
            Some(task) if task.seq == seq => self.entries.remove(key),
            _ => None,
        }
    }

    /// Remove everything, oldest entry first
    pub fn drain(&mut self) -> Vec<PreheatTask> {
        let mut tasks: Vec<PreheatTask> = self.entries.drain().map(|(_, task)| task).collect();
        tasks.sort_by_key(|task| task.seq);
        tasks
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<RequestKey> {
        let mut tasks: Vec<&PreheatTask> = self.entries.values().collect();
        tasks.sort_by_key(|task| task.seq);
        tasks.into_iter().map(|task| task.key.clone()).collect()
    }
}
