pub mod result_cache;
pub mod settings_store;

pub use result_cache::ResultCache;
pub use settings_store::SettingsStore;
