pub struct WidgetDef {
    pub id: &'static str,
    pub name: &'static str,
}

/// Dashboard widgets whose visibility is reported to the leader tab
pub const WIDGET_DEFS: &[WidgetDef] = &[
    WidgetDef { id: "widget-clock-local", name: "Local Time" },
    WidgetDef { id: "widget-clock-utc", name: "UTC" },
    WidgetDef { id: "widget-activations", name: "On the Air" },
    WidgetDef { id: "widget-map", name: "HamMap" },
    WidgetDef { id: "widget-solar", name: "Solar & Propagation" },
    WidgetDef { id: "widget-lunar", name: "Lunar / EME" },
    WidgetDef { id: "widget-rst", name: "RST Reference" },
    WidgetDef { id: "widget-spot-detail", name: "DX Detail" },
];

/// Set by build.rs
pub const BUILD_TIMESTAMP_ISO: &str = env!("BUILD_TIMESTAMP_ISO");
