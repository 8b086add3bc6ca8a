pub mod dispatcher;
pub mod intake;
pub mod loader;
pub mod responder;
