pub mod capture_stage;
pub mod detect_stage;
pub mod display_stage;
pub mod fps_counter;
pub mod orchestrator;
pub mod pipeline_error;
pub mod pipeline_logger;
pub mod pipeline_settings;
pub mod stage;
#[cfg(test)]
pub(crate) mod test_support;
