pub mod constants;
pub mod detection;
pub mod frame;
pub mod frame_slot;
pub mod source_descriptor;
