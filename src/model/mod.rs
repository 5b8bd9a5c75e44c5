pub mod loader;

pub use loader::{load_model_bytes, load_model_file, ParsedModel};
