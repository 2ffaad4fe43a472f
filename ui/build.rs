use chrono::Utc;

fn main() {
    // Stamped into the diagnostics panel as BUILD_TIMESTAMP_ISO.
    let built = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    println!("cargo:rustc-env=BUILD_TIMESTAMP_ISO={}", built);
}
