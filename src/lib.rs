pub mod catalog;
pub mod cli;
pub mod color;
pub mod confidence;
pub mod config;
pub mod crop;
pub mod db;
pub mod embed;
pub mod enrich;
pub mod error;
mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod search;
pub mod segment;
pub mod server;
#[cfg(test)]
mod testing;
pub mod utils;

pub use catalog::{EmbeddingCatalog, FeatureRecord};
pub use config::Opts;
pub use error::{CatalogError, RecognitionError};
pub use pipeline::{FeatureExtractor, Recognizer, RecognizerBuilder};
pub use search::RecognitionResult;
