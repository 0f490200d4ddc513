//! Layered configuration: compiled-in defaults → optional TOML file →
//! `DOMRATE_`-prefixed environment variables, each resolved value carrying
//! its provenance via [`Sourced`].

pub mod env;
pub mod file;
pub mod modules;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use file::load_toml_file;
pub use modules::ModuleConfig;
pub use source::{ConfigSource, Sourced};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
}
