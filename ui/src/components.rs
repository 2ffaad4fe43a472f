pub mod app;
mod diagnostics;
mod spot_picker;
mod widget_panel;
