//! Demo spot list: selecting one here shows it in every other tab.

use super::app::{SpotSelection, SELECTED_SPOT};
use crate::cross_tab;
use dioxus::prelude::*;
use serde_json::{json, Value};

fn sample_spots() -> Vec<Value> {
    vec![
        json!({"callsign": "W1AW", "frequency": "14.074", "mode": "FT8"}),
        json!({"callsign": "K4SWL", "frequency": "7.062", "mode": "CW", "reference": "US-0001"}),
        json!({"activator": "VE3XYZ", "frequency": "14.285", "mode": "SSB", "reference": "CA-1234"}),
        json!({"callsign": "JA1ABC", "frequency": "21.074", "mode": "FT8"}),
    ]
}

fn spot_label(spot: &Value) -> String {
    let call = spot
        .get("callsign")
        .or_else(|| spot.get("activator"))
        .and_then(Value::as_str)
        .unwrap_or("?");
    let frequency = spot.get("frequency").and_then(Value::as_str).unwrap_or("?");
    let mode = spot.get("mode").and_then(Value::as_str).unwrap_or("");
    format!("{call} {frequency} {mode}").trim_end().to_string()
}

#[component]
pub fn SpotPicker() -> Element {
    let selection = SELECTED_SPOT.read().clone();
    let (status, selected) = match &selection {
        SpotSelection::None => ("Nothing selected".to_string(), None),
        SpotSelection::Local(spot) => (format!("Selected here: {}", spot_label(spot)), Some(spot)),
        SpotSelection::Remote(spot) => (
            format!("Selected in another tab: {}", spot_label(spot)),
            Some(spot),
        ),
    };
    let spots: Vec<(Value, String, bool)> = sample_spots()
        .into_iter()
        .map(|spot| {
            let label = spot_label(&spot);
            let is_selected = selected == Some(&spot);
            (spot, label, is_selected)
        })
        .collect();

    rsx! {
        div {
            style: "flex: 1; min-width: 280px; border: 1px solid #ccc; border-radius: 6px; padding: 0.75rem;",
            h2 { "Spots" }
            p { "{status}" }
            ul {
                for (spot, label, is_selected) in spots {
                    li {
                        key: "{label}",
                        style: if is_selected { "font-weight: bold;" } else { "" },
                        button {
                            onclick: {
                                let spot = spot.clone();
                                move |_| {
                                    *SELECTED_SPOT.write() = SpotSelection::Local(spot.clone());
                                    cross_tab::broadcast_spot_selection(Some(spot.clone()));
                                }
                            },
                            "{label}"
                        }
                    }
                }
            }
            button {
                onclick: move |_| {
                    *SELECTED_SPOT.write() = SpotSelection::None;
                    cross_tab::broadcast_spot_selection(None);
                },
                "Clear selection"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_label_prefers_callsign() {
        let spot = json!({"callsign": "W1AW", "frequency": "14.074"});
        assert_eq!(spot_label(&spot), "W1AW 14.074");
    }

    #[test]
    fn test_spot_label_falls_back_to_activator() {
        let spot = json!({"activator": "VE3XYZ", "frequency": "14.285", "mode": "SSB"});
        assert_eq!(spot_label(&spot), "VE3XYZ 14.285 SSB");
    }
}
