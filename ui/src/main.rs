#![allow(non_snake_case)]

use dioxus::prelude::*;

mod components;
mod constants;
mod cross_tab;
mod widgets;

use components::app::App;

fn main() {
    dioxus::logger::initialize_default();

    launch(App);
}
