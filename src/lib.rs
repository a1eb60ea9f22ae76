pub mod logger;
pub mod unmixing_pipeline;
