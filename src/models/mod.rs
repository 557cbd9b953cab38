// Data models (structs)
pub mod download;
pub mod history;
pub mod release;
pub mod settings;

pub use download::*;
pub use history::*;
pub use release::*;
pub use settings::*;
