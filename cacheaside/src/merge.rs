//! Result merging.
//!
//! Cache hits are decoded up front; once every fallible stage of a call has
//! succeeded the resolved values are assembled in request order and
//! committed to the caller's destination in one step.

use std::collections::{BTreeSet, HashMap};

use cacheaside_core::{CacheAsideError, CacheAsideResult, PreconditionError, ValueCodec};
use cacheaside_store::ReadResult;

/// A caller-provided container that receives merged results.
pub trait Destination<V> {
    /// Reject a destination that cannot receive `requested` results.
    ///
    /// Checked before any cache or source work.
    fn check_len(&self, requested: usize) -> Result<(), PreconditionError> {
        let _ = requested;
        Ok(())
    }

    /// Commit `resolved` (one slot per requested key, in order). Slots that
    /// resolved to nothing leave the destination untouched. Returns whether
    /// any value was placed.
    fn fill(&mut self, resolved: Vec<Option<V>>) -> bool;
}

/// Single value: the first requested key that resolves wins.
impl<V> Destination<V> for Option<V> {
    fn fill(&mut self, resolved: Vec<Option<V>>) -> bool {
        match resolved.into_iter().flatten().next() {
            Some(value) => {
                *self = Some(value);
                true
            }
            None => false,
        }
    }
}

/// Growable sequence: extended with `None` up to the number of requested keys.
impl<V> Destination<V> for Vec<Option<V>> {
    fn fill(&mut self, resolved: Vec<Option<V>>) -> bool {
        if self.len() < resolved.len() {
            self.resize_with(resolved.len(), || None);
        }
        Destination::fill(self.as_mut_slice(), resolved)
    }
}

/// Fixed sequence: must hold at least one slot per requested key.
impl<V> Destination<V> for [Option<V>] {
    fn check_len(&self, requested: usize) -> Result<(), PreconditionError> {
        if self.len() < requested {
            return Err(PreconditionError::InvalidDestination {
                capacity: self.len(),
                requested,
            });
        }
        Ok(())
    }

    fn fill(&mut self, resolved: Vec<Option<V>>) -> bool {
        let mut found = false;
        for (slot, value) in self.iter_mut().zip(resolved) {
            if let Some(value) = value {
                *slot = Some(value);
                found = true;
            }
        }
        found
    }
}

/// Decode the cache hits for `names`.
///
/// Every name present in `hits` ends up in the returned map: empty bytes are
/// a cached negative (`None`), and a payload decoding to the codec's null is
/// treated the same way. `store_name` maps a requested name to the name it
/// is stored under.
pub(crate) fn decode_hits<V>(
    codec: &dyn ValueCodec<V>,
    names: &[String],
    hits: &ReadResult,
    store_name: impl Fn(&str) -> String,
) -> CacheAsideResult<HashMap<String, Option<V>>> {
    let mut cached = HashMap::with_capacity(hits.len());
    for name in names {
        if cached.contains_key(name) {
            continue;
        }
        let stored = store_name(name);
        let Some(data) = hits.get(&stored) else {
            continue;
        };
        let value = if data.is_empty() {
            None
        } else {
            codec
                .decode(data)
                .map_err(|source| CacheAsideError::Decode {
                    key: stored,
                    source,
                })?
        };
        cached.insert(name.clone(), value);
    }
    Ok(cached)
}

/// Names with no cache opinion, sorted and deduplicated.
pub(crate) fn miss_set<V>(names: &[String], cached: &HashMap<String, Option<V>>) -> Vec<String> {
    names
        .iter()
        .filter(|name| !cached.contains_key(*name))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Assemble one slot per requested name, in request order.
///
/// A name resolved from the cache never falls through to `fetched`.
pub(crate) fn assemble<V: Clone>(
    names: &[String],
    cached: &HashMap<String, Option<V>>,
    fetched: &HashMap<String, V>,
) -> Vec<Option<V>> {
    names
        .iter()
        .map(|name| match cached.get(name) {
            Some(hit) => hit.clone(),
            None => fetched.get(name).cloned(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
