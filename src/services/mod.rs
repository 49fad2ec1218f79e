pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod publisher;
pub mod queue;
pub mod storage;
