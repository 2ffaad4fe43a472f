use crate::message::{SerializedInterests, WidgetId};
use crate::tab_id::TabId;
use std::collections::{BTreeMap, BTreeSet};

/// Which widgets each known tab currently has visible.
///
/// The leader fills this from `interest-announce` messages; followers mirror
/// the leader's copy from heartbeats. A tab's own entry only ever comes from
/// the tab itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestRegistry {
    entries: BTreeMap<TabId, BTreeSet<WidgetId>>,
}

impl InterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<I>(&mut self, tab_id: TabId, widgets: I)
    where
        I: IntoIterator<Item = WidgetId>,
    {
        self.entries.insert(tab_id, widgets.into_iter().collect());
    }

    pub fn remove(&mut self, tab_id: &TabId) -> bool {
        self.entries.remove(tab_id).is_some()
    }

    pub fn get(&self, tab_id: &TabId) -> Option<&BTreeSet<WidgetId>> {
        self.entries.get(tab_id)
    }

    pub fn contains(&self, tab_id: &TabId) -> bool {
        self.entries.contains_key(tab_id)
    }

    /// Number of tabs with an entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn serialize(&self) -> SerializedInterests {
        self.entries
            .iter()
            .map(|(tab, widgets)| (tab.clone(), widgets.iter().cloned().collect()))
            .collect()
    }

    /// Replace every peer entry with the leader's aggregate, keeping `own_id`
    /// untouched.
    pub fn mirror_from_leader(&mut self, own_id: &TabId, aggregate: &SerializedInterests) {
        self.entries.retain(|tab, _| tab == own_id);
        for (tab, widgets) in aggregate {
            if tab == own_id {
                continue;
            }
            self.entries
                .insert(tab.clone(), widgets.iter().cloned().collect());
        }
    }
}
