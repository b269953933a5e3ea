cfg_if::cfg_if! {
    if #[cfg(all(feature = "server", feature = "client", not(target_arch = "wasm32")))] {
        mod client_integration;
        mod controller;
        mod helpers;
    }
}
