//! Conversion of raw camera buffers into packed RGBA

use std::time::Instant;

use tracing::trace;
use zune_jpeg::JpegDecoder;

use super::frame::PixelFormat;
use crate::error::{Error, Result};

const CLAMP_MAX: i32 = 262_143;

/// Convert one YUV sample (BT.601, limited range) to RGBA.
#[inline]
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = (y as i32 - 16).max(0);
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = 1192 * y + 1634 * v;
    let g = 1192 * y - 833 * v - 400 * u;
    let b = 1192 * y + 2066 * u;
    [
        (r.clamp(0, CLAMP_MAX) >> 10) as u8,
        (g.clamp(0, CLAMP_MAX) >> 10) as u8,
        (b.clamp(0, CLAMP_MAX) >> 10) as u8,
        0xff,
    ]
}

/// Planes of a 4:2:0 image. For NV12 `u` and `v` point into the same
/// interleaved plane, offset by one byte.
pub struct Yuv420<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
    /// 1 for planar (I420), 2 for semi-planar (NV12)
    pub uv_pixel_stride: usize,
}

pub fn yuv420_to_rgba(planes: &Yuv420<'_>, width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let ps = planes.uv_pixel_stride;
    if ps != 1 && ps != 2 {
        return Err(Error::Decode(format!("unsupported chroma pixel stride {}", ps)));
    }

    if w == 0 || h == 0 {
        return Err(Error::Decode(format!("invalid frame size {}x{}", w, h)));
    }

    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(2);
    let y_needed = planes.y_stride * (h - 1) + w;
    let uv_needed = planes.uv_stride * (chroma_h - 1) + (chroma_w - 1) * ps + 1;
    if planes.y_stride < w || planes.y.len() < y_needed {
        return Err(Error::Decode("luma plane too short".into()));
    }
    if planes.u.len() < uv_needed || planes.v.len() < uv_needed {
        return Err(Error::Decode("chroma plane too short".into()));
    }

    let mut out = Vec::with_capacity(w * h * 4);
    for row in 0..h {
        let y_row = &planes.y[row * planes.y_stride..];
        let uv_off = (row / 2) * planes.uv_stride;
        for col in 0..w {
            let c = uv_off + (col / 2) * ps;
            out.extend_from_slice(&yuv_to_rgba(y_row[col], planes.u[c], planes.v[c]));
        }
    }
    Ok(out)
}

/// Packed 4:2:2, `Y0 U Y1 V` per pixel pair
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let stride = if stride == 0 { w * 2 } else { stride };
    if stride < w * 2 || data.len() < stride * h.saturating_sub(1) + w * 2 {
        return Err(Error::Decode("YUYV buffer too short".into()));
    }

    let mut out = Vec::with_capacity(w * h * 4);
    for row in 0..h {
        let line = &data[row * stride..row * stride + w * 2];
        for pair in line.chunks(4) {
            if let [y0, u, y1, v] = *pair {
                out.extend_from_slice(&yuv_to_rgba(y0, u, v));
                out.extend_from_slice(&yuv_to_rgba(y1, u, v));
            } else if let [y0, u] = *pair {
                // Odd width: last pixel has no partner
                out.extend_from_slice(&yuv_to_rgba(y0, u, 128));
            }
        }
    }
    Ok(out)
}

fn expand_rgb(data: &[u8], width: u32, height: u32, stride: usize, bgr: bool) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let stride = if stride == 0 { w * 3 } else { stride };
    if stride < w * 3 || data.len() < stride * h.saturating_sub(1) + w * 3 {
        return Err(Error::Decode("RGB buffer too short".into()));
    }

    let mut rgba = Vec::with_capacity(w * h * 4);
    for row in 0..h {
        for px in data[row * stride..row * stride + w * 3].chunks_exact(3) {
            if bgr {
                rgba.extend_from_slice(&[px[2], px[1], px[0], 255]);
            } else {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
        }
    }
    Ok(rgba)
}

pub fn rgb24_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    expand_rgb(data, width, height, stride, false)
}

pub fn bgr24_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    expand_rgb(data, width, height, stride, true)
}

/// Drop row padding from an RGBA buffer
pub fn compact_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let row = w * 4;
    let stride = if stride == 0 { row } else { stride };
    if stride < row || data.len() < stride * h.saturating_sub(1) + row {
        return Err(Error::Decode("RGBA buffer too short".into()));
    }
    if stride == row {
        return Ok(data[..row * h].to_vec());
    }

    let mut out = Vec::with_capacity(row * h);
    for r in 0..h {
        out.extend_from_slice(&data[r * stride..r * stride + row]);
    }
    Ok(out)
}

pub fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut decoder = JpegDecoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| Error::Decode(format!("MJPEG: {:?}", e)))?;

    let (w, h) = decoder
        .dimensions()
        .ok_or_else(|| Error::Decode("MJPEG: missing dimensions".into()))?;
    if (w, h) != (width as usize, height as usize) {
        return Err(Error::Decode(format!(
            "MJPEG frame is {}x{}, expected {}x{}",
            w, h, width, height
        )));
    }
    if pixels.len() != w * h * 3 {
        return Err(Error::Decode("MJPEG: expected 3-channel output".into()));
    }

    rgb24_to_rgba(&pixels, width, height, 0)
}

/// Convert a raw buffer in `format` to packed RGBA (`width * height * 4` bytes).
///
/// `stride` is the luma / packed row length in bytes; 0 means tightly packed.
pub fn to_rgba(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
) -> Result<Vec<u8>> {
    let start = Instant::now();
    let (w, h) = (width as usize, height as usize);

    let rgba = match format {
        PixelFormat::Rgba => compact_rgba(data, width, height, stride)?,
        PixelFormat::Rgb24 => rgb24_to_rgba(data, width, height, stride)?,
        PixelFormat::Bgr24 => bgr24_to_rgba(data, width, height, stride)?,
        PixelFormat::Yuyv4 => yuyv_to_rgba(data, width, height, stride)?,
        PixelFormat::Mjpeg => mjpeg_to_rgba(data, width, height)?,
        PixelFormat::Nv12 => {
            let y_stride = if stride == 0 { w } else { stride };
            let split = (y_stride * h).min(data.len());
            let (y, uv) = data.split_at(split);
            let planes = Yuv420 {
                y,
                u: uv,
                v: uv.get(1..).unwrap_or(&[]),
                y_stride,
                uv_stride: y_stride,
                uv_pixel_stride: 2,
            };
            yuv420_to_rgba(&planes, width, height)?
        }
        PixelFormat::I420 => {
            let y_stride = if stride == 0 { w } else { stride };
            let uv_stride = y_stride.div_ceil(2);
            let y_len = (y_stride * h).min(data.len());
            let c_len = uv_stride * h.div_ceil(2);
            let (y, rest) = data.split_at(y_len);
            let (u, v) = rest.split_at(c_len.min(rest.len()));
            let planes = Yuv420 {
                y,
                u,
                v,
                y_stride,
                uv_stride,
                uv_pixel_stride: 1,
            };
            yuv420_to_rgba(&planes, width, height)?
        }
    };

    let elapsed = start.elapsed();
    metrics::histogram!("convert_time_us").record(elapsed.as_micros() as f64);
    trace!(%format, ?elapsed, "converted frame to RGBA");
    Ok(rgba)
}

/*
 *  NV12                    I420
 *
 *  Y0Y1Y2Y3Y4Y5Y6Y7        Y0Y1Y2Y3Y4Y5Y6Y7
 *  Y8Y9...                 Y8Y9...
 *  U0V0U1V1U2V2U3V3        U0U1U2U3
 *                          V0V1V2V3
 */

/// Split the interleaved chroma plane of an even-sized NV12 image.
pub fn nv12_to_i420(nv12: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let luma = width * height;
    let size = luma * 3 / 2;
    if width % 2 != 0 || height % 2 != 0 || nv12.len() < size {
        return Err(Error::Decode("NV12 buffer too short or odd-sized".into()));
    }

    let mut out = vec![0u8; size];
    out[..luma].copy_from_slice(&nv12[..luma]);
    let quarter = luma / 4;
    let (u, v) = out[luma..].split_at_mut(quarter);
    for (i, pair) in nv12[luma..size].chunks_exact(2).enumerate() {
        u[i] = pair[0];
        v[i] = pair[1];
    }
    Ok(out)
}

/// Interleave the chroma planes of an even-sized I420 image.
pub fn i420_to_nv12(i420: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let luma = width * height;
    let size = luma * 3 / 2;
    if width % 2 != 0 || height % 2 != 0 || i420.len() < size {
        return Err(Error::Decode("I420 buffer too short or odd-sized".into()));
    }

    let mut out = vec![0u8; size];
    out[..luma].copy_from_slice(&i420[..luma]);
    let quarter = luma / 4;
    let (u, v) = i420[luma..size].split_at(quarter);
    for (i, pair) in out[luma..].chunks_exact_mut(2).enumerate() {
        pair[0] = u[i];
        pair[1] = v[i];
    }
    Ok(out)
}
