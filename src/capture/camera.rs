use super::{CaptureError, FrameGeometry, FrameSource, PixelLayout, RawFrame};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
    Camera,
};

/// Native camera source backed by nokhwa
///
/// Frames are decoded to packed RGB24. The negotiated resolution must match
/// the configured geometry; the stream is never rescaled.
pub struct CameraSource {
    camera: Camera,
    geometry: FrameGeometry,
    device: String,
}

impl CameraSource {
    /// Open and start the camera identified by `device`.
    ///
    /// `device` may be a numeric index, a `/dev/videoN` path or a backend
    /// specific name.
    pub fn open(device: &str, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        let index = parse_camera_index(device);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps),
        ));

        let mut camera = Camera::new(index, requested)
            .map_err(|e| CaptureError::Open(format!("camera {}: {}", device, e)))?;

        camera
            .open_stream()
            .map_err(|e| CaptureError::Open(format!("camera {} stream: {}", device, e)))?;

        let resolution = camera.resolution();
        if resolution.width() != width || resolution.height() != height {
            let _ = camera.stop_stream();
            return Err(CaptureError::Open(format!(
                "camera {} negotiated {}x{}, expected {}x{}",
                device,
                resolution.width(),
                resolution.height(),
                width,
                height
            )));
        }

        log::info!(
            "Opened camera {} at {}x{}@{}",
            device,
            width,
            height,
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            geometry: FrameGeometry::new(width, height, PixelLayout::Rgb24),
            device: device.to_string(),
        })
    }
}

impl FrameSource for CameraSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("Camera {} frame grab failed: {}", self.device, e);
                return None;
            }
        };

        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Camera {} frame decode failed: {}", self.device, e);
                return None;
            }
        };

        // Geometry is reported as decoded; the relay rejects mismatches.
        let geometry = FrameGeometry::new(image.width(), image.height(), PixelLayout::Rgb24);
        Some(RawFrame {
            data: image.into_raw(),
            geometry,
        })
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera {}: {}", self.device, e);
        }
    }
}

fn parse_camera_index(device: &str) -> CameraIndex {
    if let Ok(index) = device.parse::<u32>() {
        return CameraIndex::Index(index);
    }
    if let Some(index) = device
        .strip_prefix("/dev/video")
        .and_then(|n| n.parse::<u32>().ok())
    {
        return CameraIndex::Index(index);
    }
    CameraIndex::String(device.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera_index() {
        assert_eq!(parse_camera_index("0"), CameraIndex::Index(0));
        assert_eq!(parse_camera_index("/dev/video2"), CameraIndex::Index(2));
        assert_eq!(
            parse_camera_index("/dev/video-front"),
            CameraIndex::String("/dev/video-front".to_string())
        );
        assert_eq!(
            parse_camera_index("FaceTime HD Camera"),
            CameraIndex::String("FaceTime HD Camera".to_string())
        );
    }

    #[test]
    fn test_open_missing_camera_fails() {
        let result = CameraSource::open("/dev/video999", 640, 480, 30);
        assert!(matches!(result, Err(CaptureError::Open(_))));
    }
}
