pub mod pipeline;
pub mod subsystems;

pub use pipeline::{ChatPipeline, DisplayLabels};
pub use subsystems::dispatcher::{result_channel, Dispatcher, ResultSender};
pub use subsystems::loader::{ModelLoader, ModelPhase};
