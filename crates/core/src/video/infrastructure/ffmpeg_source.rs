use std::path::Path;
use std::time::Duration;

use crate::shared::frame::{ColorOrder, Frame};
use crate::shared::source_descriptor::SourceDescriptor;
use crate::video::domain::video_source::{SourceError, SourceInfo, VideoSource};

/// Consecutive EAGAIN reads tolerated before a device counts as failed.
const MAX_TRANSIENT_RETRIES: u32 = 500;
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Capture resolution and rate requested from devices at open time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

/// Decodes frames from a video file or capture device via ffmpeg-next.
///
/// Every decoded frame is converted to packed BGR24, the pipeline's native
/// layout.
pub struct FfmpegSource {
    device_settings: DeviceSettings,
    descriptor: Option<SourceDescriptor>,
    stream: Option<OpenStream>,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

struct OpenStream {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
}

impl FfmpegSource {
    pub fn new(device_settings: DeviceSettings) -> Self {
        Self {
            device_settings,
            descriptor: None,
            stream: None,
        }
    }

    fn open_input(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<ffmpeg_next::format::context::Input, String> {
        match descriptor {
            SourceDescriptor::File(path) => open_file(path),
            SourceDescriptor::Device(index) => open_device(*index, &self.device_settings),
        }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new(DeviceSettings::default())
    }
}

impl VideoSource for FfmpegSource {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<SourceInfo, SourceError> {
        let open_failed = |reason: String| SourceError::OpenFailed {
            source_name: descriptor.to_string(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_failed(e.to_string()))?;
        self.close();

        let input = self.open_input(descriptor).map_err(open_failed)?;
        let (stream, native_fps) = OpenStream::new(input).map_err(open_failed)?;

        let fps = match descriptor {
            SourceDescriptor::Device(_) => self.device_settings.fps,
            SourceDescriptor::File(_) => native_fps,
        };
        let info = SourceInfo {
            width: stream.width,
            height: stream.height,
            fps,
        };

        log::info!(
            "Opened {descriptor}: {}x{} @ {:.1} fps",
            info.width,
            info.height,
            info.fps
        );

        self.stream = Some(stream);
        self.descriptor = Some(descriptor.clone());
        Ok(info)
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let stream = self.stream.as_mut().ok_or(SourceError::NotOpen)?;
        stream.next_frame()
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        let stream = self.stream.as_mut().ok_or(SourceError::NotOpen)?;
        if stream.seek_to_start().is_ok() {
            return Ok(());
        }

        // Not seekable (pipes, some network streams): reopen instead.
        let descriptor = self.descriptor.clone().ok_or(SourceError::NotOpen)?;
        log::debug!("Seek failed on {descriptor}, reopening");
        self.open(&descriptor).map(|_| ())
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

impl OpenStream {
    fn new(input: ffmpeg_next::format::context::Input) -> Result<(Self, f64), String> {
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("no video stream found")?;

        let stream_index = stream.index();
        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| e.to_string())?;
        let decoder = codec_ctx.decoder().video().map_err(|e| e.to_string())?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| e.to_string())?;

        Ok((
            Self {
                input,
                decoder,
                scaler,
                stream_index,
                width,
                height,
                frame_index: 0,
                flushing: false,
            },
            fps,
        ))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut retries = 0;
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            // Packet::read reports errors instead of retrying them, so an
            // unplugged device surfaces here rather than stalling the loop.
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("Skipping undecodable packet: {e}");
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                }
                Err(e) if is_transient(&e) && retries < MAX_TRANSIENT_RETRIES => {
                    retries += 1;
                    std::thread::sleep(TRANSIENT_RETRY_DELAY);
                }
                Err(e) => return Err(SourceError::ReadFailed(e.to_string())),
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut bgr_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut bgr_frame)
            .map_err(|e| SourceError::ReadFailed(e.to_string()))?;

        let pixels = extract_packed_pixels(&bgr_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index)
            .with_color_order(ColorOrder::Bgr);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn seek_to_start(&mut self) -> Result<(), ffmpeg_next::Error> {
        self.input.seek(0, ..)?;
        self.decoder.flush();
        self.frame_index = 0;
        self.flushing = false;
        Ok(())
    }
}

fn open_file(path: &Path) -> Result<ffmpeg_next::format::context::Input, String> {
    ffmpeg_next::format::input(path).map_err(|e| e.to_string())
}

/// Opens capture device `index` through the platform's input device format.
fn open_device(
    index: u32,
    settings: &DeviceSettings,
) -> Result<ffmpeg_next::format::context::Input, String> {
    ffmpeg_next::device::register_all();

    let (format_name, url) = device_url(index);
    let format = find_input_format(format_name)
        .ok_or_else(|| format!("input device format '{format_name}' is unavailable"))?;

    let mut options = ffmpeg_next::Dictionary::new();
    options.set(
        "video_size",
        &format!("{}x{}", settings.width, settings.height),
    );
    options.set("framerate", &format!("{}", settings.fps));

    match ffmpeg_next::format::open_with(
        &url,
        &ffmpeg_next::format::Format::Input(format),
        options,
    ) {
        Ok(ffmpeg_next::format::context::Context::Input(input)) => Ok(input),
        Ok(_) => Err(format!("{url} did not open as an input")),
        Err(e) => Err(e.to_string()),
    }
}

fn find_input_format(name: &str) -> Option<ffmpeg_next::format::Input> {
    ffmpeg_next::device::input::video().find_map(|format| match format {
        ffmpeg_next::format::Format::Input(input) if input.name() == name => Some(input),
        _ => None,
    })
}

/// Devices report "no packet yet" as EAGAIN; that is not a disconnect.
fn is_transient(error: &ffmpeg_next::Error) -> bool {
    matches!(error, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::error::EAGAIN)
}

/// Input format and URL naming capture device `index` on this platform.
fn device_url(index: u32) -> (&'static str, String) {
    if cfg!(target_os = "macos") {
        ("avfoundation", format!("{index}:none"))
    } else if cfg!(target_os = "windows") {
        ("dshow", format!("video={index}"))
    } else {
        ("v4l2", format!("/dev/video{index}"))
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly-packed buffer.
///
/// ffmpeg frames may pad each row (stride > width*3); the padding is
/// dropped.
fn extract_packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 60) % 256) as u8;
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let offset = row * stride + col * 3;
                    data[offset..offset + 3].fill(value);
                }
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();

            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    fn test_video(dir: &Path, num_frames: usize) -> PathBuf {
        let path = dir.join("clip.mp4");
        create_test_video(&path, num_frames, 160, 120, 30);
        path
    }

    #[test]
    fn test_open_file_reports_size_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 3);

        let mut source = FfmpegSource::default();
        let info = source.open(&SourceDescriptor::File(path)).unwrap();
        assert_eq!(info.width, 160);
        assert_eq!(info.height, 120);
        assert!(info.fps > 0.0);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut source = FfmpegSource::default();
        let err = source
            .open(&SourceDescriptor::File(PathBuf::from("/nonexistent/clip.mp4")))
            .unwrap_err();
        assert_eq!(err.code(), "source_open_failed");
    }

    #[test]
    fn test_read_yields_bgr_frames_then_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 3);

        let mut source = FfmpegSource::default();
        source.open(&SourceDescriptor::File(path)).unwrap();

        let mut indices = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.color_order(), ColorOrder::Bgr);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_rewind_restarts_from_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 3);

        let mut source = FfmpegSource::default();
        source.open(&SourceDescriptor::File(path)).unwrap();
        while source.read().unwrap().is_some() {}

        source.rewind().unwrap();
        let frame = source.read().unwrap().expect("frame after rewind");
        assert_eq!(frame.index(), 0);
    }

    #[test]
    fn test_read_without_open_fails() {
        let mut source = FfmpegSource::default();
        assert_eq!(source.read().unwrap_err(), SourceError::NotOpen);
    }

    #[test]
    fn test_close_releases_file_for_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 2);
        let descriptor = SourceDescriptor::File(path);

        let mut source = FfmpegSource::default();
        source.open(&descriptor).unwrap();
        source.close();
        source.close();
        assert_eq!(source.read().unwrap_err(), SourceError::NotOpen);

        let mut other = FfmpegSource::default();
        assert!(other.open(&descriptor).is_ok());
    }

    #[test]
    fn test_device_url_uses_index() {
        let (_, url) = device_url(3);
        assert!(url.contains('3'));
    }

    #[test]
    fn test_eagain_is_transient() {
        let again = ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EAGAIN,
        };
        assert!(is_transient(&again));
        assert!(!is_transient(&ffmpeg_next::Error::Eof));
        assert!(!is_transient(&ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EINVAL,
        }));
    }

    #[test]
    fn test_unknown_input_format_is_unavailable() {
        ffmpeg_next::device::register_all();
        assert!(find_input_format("no-such-capture-format").is_none());
    }
}
