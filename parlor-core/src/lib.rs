pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod generation;
pub mod models;
pub mod onnx_generator;
pub mod store;

pub use config::ParlorConfig;
pub use display::{Category, DisplayTuple};
pub use error::ParlorError;
pub use generation::{GenerationError, SamplingConfig, TextGenerator};
pub use models::{MessageId, ResponseId, SessionId};
pub use onnx_generator::OnnxGenerator;
pub use store::ChatStore;
