pub mod config;
pub mod corpus;
pub mod engine;
pub mod index;
pub mod optimizer;
pub mod pipeline;
pub mod runs;
pub mod tracker;
