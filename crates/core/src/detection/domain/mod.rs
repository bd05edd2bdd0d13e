pub mod annotated_frame;
pub mod face_detector;
pub mod frame_annotator;
mod label_glyphs;
