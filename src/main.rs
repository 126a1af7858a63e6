// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

/// Desktop entry point for Vibe Editor
///
/// Thin wrapper around the library crate, where the Tauri setup lives.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    vibe_editor_lib::run();
}
