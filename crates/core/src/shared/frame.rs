use ndarray::ArrayView3;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// `index` is the capture sequence number assigned by the camera source,
/// starting at 0 for each acquired stream.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
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
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
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

    pub fn index(&self) -> usize {
        self.index
    }

    /// Same pixels under a new sequence number.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Luma of the pixel at `(x, y)` using BT.601 weights.
    pub fn luma(&self, x: usize, y: usize) -> f32 {
        let c = self.channels as usize;
        let offset = (y * self.width as usize + x) * c;
        if c < 3 {
            return self.data[offset] as f32;
        }
        let r = self.data[offset] as f32;
        let g = self.data[offset + 1] as f32;
        let b = self.data[offset + 2] as f32;
        0.299 * r + 0.587 * g + 0.114 * b
    }
}
