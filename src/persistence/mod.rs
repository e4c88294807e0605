pub mod files;
pub mod metadata;

pub use files::{
    atomic_write, config_file, ensure_data_dir, init_local_dir, log_dir, meta_file,
    read_file, remove_file, session_file,
};
pub use metadata::{load_metadata, save_metadata, AppMetadata};
