pub mod catalog;
pub mod clarify;
pub mod concepts;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod resolve;
pub mod semantic;
pub mod stores;
