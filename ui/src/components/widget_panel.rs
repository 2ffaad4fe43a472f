use crate::constants::WIDGET_DEFS;
use crate::widgets::{is_widget_visible, set_widget_visible};
use dioxus::prelude::*;

/// Show/hide toggles for the dashboard widgets. Toggling changes what this
/// tab reports to the leader.
#[component]
pub fn WidgetPanel() -> Element {
    // Visibility lives outside the signal graph; bump this to re-render.
    let mut revision = use_signal(|| 0u64);
    let _ = revision();

    rsx! {
        div {
            style: "flex: 1; min-width: 280px; border: 1px solid #ccc; border-radius: 6px; padding: 0.75rem;",
            h2 { "Widgets" }
            for def in WIDGET_DEFS.iter() {
                label {
                    key: "{def.id}",
                    style: "display: block;",
                    input {
                        r#type: "checkbox",
                        checked: is_widget_visible(def.id),
                        onchange: move |_| {
                            set_widget_visible(def.id, !is_widget_visible(def.id));
                            revision += 1;
                        },
                    }
                    " {def.name}"
                }
            }
        }
    }
}
