pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Most face crops produced per frame, highest confidence first.
pub const MAX_FACES: usize = 5;

/// Side length of a resampled face crop in pixels.
pub const FACE_CROP_SIZE: u32 = 150;

/// Annotation color. Identical in BGR and RGB.
pub const ANNOTATION_COLOR: [u8; 3] = [0, 255, 0];

/// Box outline thickness in pixels.
pub const BOX_THICKNESS: u32 = 2;
