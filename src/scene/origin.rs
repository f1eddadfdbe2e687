//! Election of the reference (origin) trackable.
//!
//! The reference trackable defines the scene's coordinate origin: all
//! dependent poses are computed relative to it. Candidates are held in an
//! ordered list; the first visible one wins, and a winner keeps the
//! election for as long as it stays visible so the origin does not thrash
//! between markers that are simultaneously in view.

use serde::{Deserialize, Serialize};

use crate::scene::registry::{TrackableHandle, TrackableRegistry};

/// How the candidate list is (re)populated from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Every registered trackable, in registration order.
    #[default]
    SelectAll,
    /// Only trackables whose tag appears in the list; list order gives
    /// priority.
    SelectByTag { tags: Vec<String> },
    /// No automatic population; candidates are added manually.
    ManualOnly,
}

/// Ordered candidate list plus the currently elected reference.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSelector {
    candidates: Vec<TrackableHandle>,
    elected: Option<TrackableHandle>,
}

impl ReferenceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate, optionally at the front of the list for priority.
    /// A handle already present is moved rather than duplicated.
    pub fn add_candidate(&mut self, handle: TrackableHandle, at_front: bool) {
        self.candidates.retain(|h| *h != handle);
        if at_front {
            self.candidates.insert(0, handle);
        } else {
            self.candidates.push(handle);
        }
    }

    /// Remove a candidate. Clears the election if it was the elected one.
    pub fn remove_candidate(&mut self, handle: TrackableHandle) -> bool {
        let before = self.candidates.len();
        self.candidates.retain(|h| *h != handle);
        if self.elected == Some(handle) {
            self.elected = None;
        }
        self.candidates.len() != before
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.elected = None;
    }

    pub fn candidates(&self) -> &[TrackableHandle] {
        &self.candidates
    }

    /// Repopulate the candidate list from the registry according to the
    /// selection mode. `ManualOnly` leaves the list untouched.
    pub fn rebuild(&mut self, mode: &SelectionMode, registry: &TrackableRegistry) {
        match mode {
            SelectionMode::SelectAll => {
                self.candidates = registry.handles().collect();
            }
            SelectionMode::SelectByTag { tags } => {
                self.candidates = tags
                    .iter()
                    .filter_map(|tag| registry.find_by_tag(tag))
                    .collect();
            }
            SelectionMode::ManualOnly => return,
        }
        if let Some(elected) = self.elected {
            if !self.candidates.contains(&elected) {
                self.elected = None;
            }
        }
    }

    /// The elected reference, re-elected if needed.
    ///
    /// A still-visible election is returned unchanged. Otherwise the first
    /// visible candidate in list order is elected; with none visible the
    /// election becomes `None`. The returned trackable is always visible at
    /// the time of the call.
    pub fn current_reference(&mut self, registry: &TrackableRegistry) -> Option<TrackableHandle> {
        let is_visible =
            |h: TrackableHandle| registry.get(h).map(|t| t.visible()).unwrap_or(false);

        if let Some(elected) = self.elected {
            if is_visible(elected) {
                return Some(elected);
            }
            // un-elected the moment it goes invisible, never held stale
            self.elected = None;
        }

        self.elected = self.candidates.iter().copied().find(|h| is_visible(*h));
        self.elected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::trackable::{Trackable, TrackableConfig};
    use nalgebra::Matrix4;

    fn registry_with(tags: &[&str]) -> (TrackableRegistry, Vec<TrackableHandle>) {
        let mut registry = TrackableRegistry::new();
        let handles = tags
            .iter()
            .map(|tag| {
                registry.add(Trackable::new(
                    *tag,
                    TrackableConfig::SingleBarcode {
                        barcode_id: 0,
                        width: 0.08,
                    },
                ))
            })
            .collect();
        (registry, handles)
    }

    fn set_visible(registry: &mut TrackableRegistry, handle: TrackableHandle, visible: bool) {
        let t = registry.get_mut(handle).unwrap();
        if visible {
            t.set_visible(Matrix4::identity(), None);
        } else {
            t.clear_visible();
        }
    }

    #[test]
    fn first_visible_candidate_wins() {
        let (mut registry, handles) = registry_with(&["a", "b"]);
        let mut selector = ReferenceSelector::new();
        selector.rebuild(&SelectionMode::SelectAll, &registry);

        assert_eq!(selector.current_reference(&registry), None);

        set_visible(&mut registry, handles[1], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[1]));
    }

    #[test]
    fn election_is_stable_while_visible() {
        let (mut registry, handles) = registry_with(&["a", "b"]);
        let mut selector = ReferenceSelector::new();
        selector.rebuild(&SelectionMode::SelectAll, &registry);

        set_visible(&mut registry, handles[1], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[1]));

        // the earlier-listed candidate turning visible does not steal it
        set_visible(&mut registry, handles[0], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[1]));

        // only losing visibility forces a re-election
        set_visible(&mut registry, handles[1], false);
        assert_eq!(selector.current_reference(&registry), Some(handles[0]));
    }

    #[test]
    fn elected_reference_is_always_visible() {
        let (mut registry, handles) = registry_with(&["a"]);
        let mut selector = ReferenceSelector::new();
        selector.rebuild(&SelectionMode::SelectAll, &registry);

        set_visible(&mut registry, handles[0], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[0]));

        set_visible(&mut registry, handles[0], false);
        assert_eq!(selector.current_reference(&registry), None);
    }

    #[test]
    fn front_insertion_gives_priority() {
        let (mut registry, handles) = registry_with(&["a", "b"]);
        let mut selector = ReferenceSelector::new();
        selector.add_candidate(handles[0], false);
        selector.add_candidate(handles[1], true);

        set_visible(&mut registry, handles[0], true);
        set_visible(&mut registry, handles[1], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[1]));
    }

    #[test]
    fn tag_selection_orders_by_filter() {
        let (registry, handles) = registry_with(&["a", "b", "c"]);
        let mut selector = ReferenceSelector::new();
        selector.rebuild(
            &SelectionMode::SelectByTag {
                tags: vec!["c".into(), "a".into()],
            },
            &registry,
        );
        assert_eq!(selector.candidates(), &[handles[2], handles[0]]);
    }

    #[test]
    fn removing_elected_candidate_clears_election() {
        let (mut registry, handles) = registry_with(&["a"]);
        let mut selector = ReferenceSelector::new();
        selector.add_candidate(handles[0], false);
        set_visible(&mut registry, handles[0], true);
        assert_eq!(selector.current_reference(&registry), Some(handles[0]));

        assert!(selector.remove_candidate(handles[0]));
        assert_eq!(selector.current_reference(&registry), None);
    }
}
