// Caller-facing handlers - one file per domain, errors as status strings
pub mod downloads;
pub mod settings;
pub mod updater;
