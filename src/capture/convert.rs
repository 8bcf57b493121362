use crate::capture::frame::{DecodedFrame, PixelFormat, RawPicture};
use crate::capture::source::ColorConverter;
use crate::error::CaptureError;

/// Software conversion of decoder output to packed RGB24.
#[derive(Debug, Default, Clone, Copy)]
pub struct RgbConverter;

impl ColorConverter for RgbConverter {
    fn convert(&mut self, picture: RawPicture) -> Result<DecodedFrame, CaptureError> {
        let expected = picture.format.buffer_len(picture.width, picture.height);
        if picture.data.len() < expected {
            return Err(CaptureError::Decode(format!(
                "{:?} picture {}x{} has {} bytes, expected {}",
                picture.format,
                picture.width,
                picture.height,
                picture.data.len(),
                expected
            )));
        }

        let rgb = match picture.format {
            PixelFormat::Rgb24 => {
                let mut data = picture.data;
                data.truncate(expected);
                data
            }
            PixelFormat::Bgr24 => bgr_to_rgb(&picture.data[..expected]),
            PixelFormat::Gray8 => gray_to_rgb(&picture.data[..expected]),
            PixelFormat::Yuyv4 => {
                if picture.width % 2 != 0 {
                    return Err(CaptureError::Decode(format!(
                        "YUYV picture width {} is odd",
                        picture.width
                    )));
                }
                yuyv_to_rgb(&picture.data[..expected])
            }
            PixelFormat::Cmyk32 => cmyk_to_rgb(&picture.data[..expected]),
        };

        Ok(DecodedFrame {
            rgb,
            width: picture.width,
            height: picture.height,
            pts_ns: picture.pts_ns,
        })
    }
}

fn bgr_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(3) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out
}

fn gray_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3);
    for &y in data {
        out.extend_from_slice(&[y, y, y]);
    }
    out
}

fn cmyk_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    for px in data.chunks_exact(4) {
        let k = 255 - px[3] as u32;
        for &c in &px[..3] {
            out.push(((255 - c as u32) * k / 255) as u8);
        }
    }
    out
}

/// BT.601 limited range, one chroma pair per two pixels.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for px in data.chunks_exact(4) {
        let (y0, u, y1, v) = (px[0], px[1], px[2], px[3]);
        out.extend_from_slice(&yuv_to_rgb(y0, u, v));
        out.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    out
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| x.clamp(0, 255) as u8;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}
