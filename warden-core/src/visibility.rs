// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user visibility sets.

use std::collections::{HashMap, HashSet};

use crate::document::{DocId, DocOwner, Revision};
use crate::identity::{FacilityId, UserId};

/// The set of documents one user may see, with the visibility token (the
/// revision last observed at the source) recorded per document.
///
/// Membership is exactly: reachable from the user's facility root via
/// hierarchy traversal, plus documents independently owned by the user. A
/// document id appears at most once.
///
/// A `VisibilitySet` is computed as a whole and replaced as a whole; it is
/// never mutated in place once shared, so concurrent readers observe either
/// the old or the new complete set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilitySet {
    docs: HashMap<DocId, Revision>,
    facilities: HashSet<FacilityId>,
}

impl VisibilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visible document. Returns `false` when the id was already
    /// present (the existing token wins).
    pub fn insert(&mut self, id: DocId, token: Revision) -> bool {
        match self.docs.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(token);
                true
            }
        }
    }

    /// Record a facility on or below the user's visibility root.
    pub fn insert_facility(&mut self, facility: FacilityId) -> bool {
        self.facilities.insert(facility)
    }

    pub fn contains(&self, id: &DocId) -> bool {
        self.docs.contains_key(id)
    }

    pub fn token(&self, id: &DocId) -> Option<&Revision> {
        self.docs.get(id)
    }

    pub fn contains_facility(&self, facility: &FacilityId) -> bool {
        self.facilities.contains(facility)
    }

    /// Whether a document owned as given falls within this set's view.
    ///
    /// Used for write authorization of documents which may not exist yet and
    /// therefore cannot be looked up by id.
    pub fn covers_owner(&self, owner: &DocOwner, user: &UserId) -> bool {
        if let Some(facility) = &owner.facility {
            if self.facilities.contains(facility) {
                return true;
            }
        }
        owner.user.as_ref() == Some(user)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = &DocId> {
        self.docs.keys()
    }

    /// Documents present in this set but absent from `newer`.
    ///
    /// These are the documents whose visibility was lost between two
    /// computations; each one becomes a purge-log entry.
    pub fn lost_against<'a>(&'a self, newer: &VisibilitySet) -> Vec<(&'a DocId, &'a Revision)> {
        self.docs
            .iter()
            .filter(|(id, _)| !newer.contains(id))
            .collect()
    }
}
