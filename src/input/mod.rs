pub mod handler;

pub use handler::{handle_key, opens_external_editor};
