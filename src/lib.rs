pub mod command;
pub mod genome;
pub mod pairing;
pub mod processing;
pub mod rewrite;
pub mod runtime;
pub mod threading;
