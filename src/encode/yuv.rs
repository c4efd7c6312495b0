//! Packed RGB/BGR to planar I420 conversion

use crate::capture::PixelLayout;

/// Convert a packed 24-bit frame to I420 (YUV 4:2:0 planar), BT.601.
///
/// `width` and `height` must be even; chroma is taken from the top-left
/// pixel of each 2x2 block.
pub fn packed_to_i420(packed: &[u8], width: u32, height: u32, layout: PixelLayout) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    let (r_off, b_off) = match layout {
        PixelLayout::Rgb24 => (0, 2),
        PixelLayout::Bgr24 => (2, 0),
    };

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 3;
            let r = packed[idx + r_off] as i32;
            let g = packed[idx + 1] as i32;
            let b = packed[idx + b_off] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i420_size() {
        let rgb = vec![128u8; 640 * 480 * 3];
        let yuv = packed_to_i420(&rgb, 640, 480, PixelLayout::Rgb24);
        assert_eq!(yuv.len(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_black_and_white_luma() {
        let black = packed_to_i420(&[0u8; 12], 2, 2, PixelLayout::Rgb24);
        assert_eq!(&black[..4], &[16, 16, 16, 16]);
        assert_eq!(&black[4..], &[128, 128]);

        let white = packed_to_i420(&[255u8; 12], 2, 2, PixelLayout::Rgb24);
        assert_eq!(&white[..4], &[235, 235, 235, 235]);
    }

    #[test]
    fn test_bgr_matches_swapped_rgb() {
        let rgb: Vec<u8> = [200u8, 30, 90].repeat(4);
        let bgr: Vec<u8> = [90u8, 30, 200].repeat(4);
        assert_eq!(
            packed_to_i420(&rgb, 2, 2, PixelLayout::Rgb24),
            packed_to_i420(&bgr, 2, 2, PixelLayout::Bgr24)
        );
    }

    #[test]
    fn test_pure_red_chroma() {
        let red: Vec<u8> = [255u8, 0, 0].repeat(4);
        let yuv = packed_to_i420(&red, 2, 2, PixelLayout::Rgb24);
        // V dominates for red, U sits below neutral.
        assert!(yuv[5] > 200);
        assert!(yuv[4] < 128);
    }
}
