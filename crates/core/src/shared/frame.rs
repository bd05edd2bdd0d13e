use ndarray::{ArrayView3, ArrayViewMut3};

/// Byte order of the color channels in a 3- or 4-channel frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorOrder {
    /// Blue, green, red. The order frames travel through the pipeline in.
    #[default]
    Bgr,
    Rgb,
}

/// A single video frame: contiguous pixel bytes in row-major order.
///
/// Frames inside the pipeline are BGR ([`ColorOrder::Bgr`]). Conversion to
/// another order happens once, at the render boundary.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    color_order: ColorOrder,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            color_order: ColorOrder::default(),
        }
    }

    pub fn with_color_order(mut self, color_order: ColorOrder) -> Self {
        self.color_order = color_order;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of this frame within its source, in decode order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn color_order(&self) -> ColorOrder {
        self.color_order
    }

    /// Reorders the color channels in place when `target` differs.
    ///
    /// Frames with fewer than three channels carry no color order and are
    /// returned unchanged apart from the tag.
    pub fn into_color_order(mut self, target: ColorOrder) -> Self {
        if self.color_order != target && self.channels >= 3 {
            for pixel in self.data.chunks_exact_mut(self.channels as usize) {
                pixel.swap(0, 2);
            }
        }
        self.color_order = target;
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
