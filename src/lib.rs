pub mod logger;
pub mod realign_pipeline;
