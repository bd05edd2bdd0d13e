use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the capture stage pulls frames from.
///
/// Decided once when the pipeline is configured; stages dispatch on the
/// variant instead of inspecting the value again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A capture device by index. Ends the pipeline on disconnect.
    Device(u32),
    /// A video file or URI. Loops back to the start at end of stream.
    File(PathBuf),
}

impl SourceDescriptor {
    pub fn is_device(&self) -> bool {
        matches!(self, SourceDescriptor::Device(_))
    }

    pub fn loops(&self) -> bool {
        matches!(self, SourceDescriptor::File(_))
    }
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        SourceDescriptor::Device(0)
    }
}

/// A bare non-negative integer names a device; anything else is a path.
impl FromStr for SourceDescriptor {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.parse::<u32>() {
            Ok(index) => Ok(SourceDescriptor::Device(index)),
            Err(_) => Ok(SourceDescriptor::File(PathBuf::from(trimmed))),
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Device(index) => write!(f, "device {index}"),
            SourceDescriptor::File(path) => write!(f, "file {}", path.display()),
        }
    }
}
