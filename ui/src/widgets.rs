//! Which dashboard widgets this tab is showing.
//!
//! Kept outside the Dioxus signal graph because the coordinator reads it from
//! timer and channel callbacks, where no component runtime is in scope.

use crate::constants::WIDGET_DEFS;
use crate::cross_tab::WIDGET_VISIBILITY_EVENT;
use dioxus::logger::tracing::warn;
use hamtab_xtab_core::WidgetId;
use std::cell::RefCell;
use std::collections::HashSet;

thread_local! {
    static HIDDEN_WIDGETS: RefCell<HashSet<&'static str>> = RefCell::new(HashSet::new());
}

pub fn is_widget_visible(id: &str) -> bool {
    HIDDEN_WIDGETS.with(|hidden| !hidden.borrow().contains(id))
}

/// Show or hide a widget and raise `hamtab:widget-vis-changed` on the
/// document so interested listeners (the coordinator among them) react.
pub fn set_widget_visible(id: &'static str, visible: bool) {
    let changed = HIDDEN_WIDGETS.with(|hidden| {
        let mut hidden = hidden.borrow_mut();
        if visible {
            hidden.remove(id)
        } else {
            hidden.insert(id)
        }
    });
    if changed {
        dispatch_visibility_changed();
    }
}

/// Ids of the visible widgets, in dashboard order
pub fn visible_widget_ids() -> Vec<WidgetId> {
    WIDGET_DEFS
        .iter()
        .filter(|def| is_widget_visible(def.id))
        .map(|def| def.id.to_string())
        .collect()
}

fn dispatch_visibility_changed() {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    match web_sys::Event::new(WIDGET_VISIBILITY_EVENT) {
        Ok(event) => {
            if let Err(e) = document.dispatch_event(&event) {
                warn!("Failed to dispatch {}: {:?}", WIDGET_VISIBILITY_EVENT, e);
            }
        }
        Err(e) => warn!("Failed to create {} event: {:?}", WIDGET_VISIBILITY_EVENT, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_widget_starts_visible() {
        assert!(WIDGET_DEFS.iter().all(|def| is_widget_visible(def.id)));
        assert_eq!(visible_widget_ids().len(), WIDGET_DEFS.len());
        assert_eq!(visible_widget_ids()[3], "widget-map");
    }
}
