pub mod condition;
pub mod interchange;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "server", not(target_arch = "wasm32")))] {
        pub mod events;
        pub mod instruction;
        pub mod interpreter;
        pub mod json_path;
        mod listener;
        pub mod server;
        pub mod template;
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(feature = "client", not(target_arch = "wasm32")))] {
        pub mod client;
        pub mod funcs;
        mod network_client;
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub mod hyper_helpers;
