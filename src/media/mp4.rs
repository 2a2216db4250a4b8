//! H.264-in-MP4 clip writing.
//!
//! Frames are converted to 4:2:0 YCbCr, encoded with the pure-Rust
//! `less-avc` H.264 encoder, and muxed into an MP4 container. Encoding
//! pads each plane up to macroblock-aligned dimensions; the track config
//! declares the true frame size so players crop the padding away.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use less_avc::ycbcr_image::{DataPlane, Planes, YCbCrImage};

use crate::capture::frame::{FrameData, FrameImage};

/// Time units per second in the container.
const MOVIE_TIMESCALE: u32 = 1_000_000;
const TRACK_ID: u32 = 1;

/// NAL start code assumed in less-avc output.
const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Planar 4:2:0 image with macroblock-aligned (16x16) dimensions.
struct I420Frame {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    padded_width: u32,
    padded_height: u32,
}

fn pad16(v: u32) -> u32 {
    (v + 15) & !15
}

/// BT.601 studio-swing RGB -> YCbCr.
fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let cb = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let cr = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (
        y.clamp(0, 255) as u8,
        cb.clamp(0, 255) as u8,
        cr.clamp(0, 255) as u8,
    )
}

fn convert_to_i420(image: &FrameImage) -> I420Frame {
    let pw = pad16(image.width);
    let ph = pad16(image.height);
    let cw = (pw / 2) as usize;
    let ch = (ph / 2) as usize;
    let mut y_plane = vec![0u8; pw as usize * ph as usize];
    let mut u_plane = vec![128u8; cw * ch];
    let mut v_plane = vec![128u8; cw * ch];

    // Edge-replicated luma.
    for py in 0..ph {
        let sy = py.min(image.height - 1);
        for px in 0..pw {
            let sx = px.min(image.width - 1);
            let [r, g, b] = image.pixel(sx, sy);
            let (y, _, _) = rgb_to_ycbcr(r, g, b);
            y_plane[py as usize * pw as usize + px as usize] = y;
        }
    }

    // Chroma sampled from the average of each 2x2 block.
    for cy in 0..ch {
        for cx in 0..cw {
            let (mut sum_r, mut sum_g, mut sum_b) = (0u32, 0u32, 0u32);
            for dy in 0..2u32 {
                for dx in 0..2u32 {
                    let sx = (cx as u32 * 2 + dx).min(image.width - 1);
                    let sy = (cy as u32 * 2 + dy).min(image.height - 1);
                    let [r, g, b] = image.pixel(sx, sy);
                    sum_r += r as u32;
                    sum_g += g as u32;
                    sum_b += b as u32;
                }
            }
            let (_, cb, cr) = rgb_to_ycbcr(
                (sum_r / 4) as u8,
                (sum_g / 4) as u8,
                (sum_b / 4) as u8,
            );
            u_plane[cy * cw + cx] = cb;
            v_plane[cy * cw + cx] = cr;
        }
    }

    I420Frame {
        y: y_plane,
        u: u_plane,
        v: v_plane,
        padded_width: pw,
        padded_height: ph,
    }
}

impl I420Frame {
    fn as_ycbcr(&self) -> YCbCrImage<'_> {
        let stride = self.padded_width as usize;
        let y = DataPlane {
            data: &self.y,
            stride,
            bit_depth: less_avc::BitDepth::Depth8,
        };
        let u = DataPlane {
            data: &self.u,
            stride: stride / 2,
            bit_depth: less_avc::BitDepth::Depth8,
        };
        let v = DataPlane {
            data: &self.v,
            stride: stride / 2,
            bit_depth: less_avc::BitDepth::Depth8,
        };
        YCbCrImage {
            planes: Planes::YCbCr((y, u, v)),
            width: self.padded_width,
            height: self.padded_height,
        }
    }
}

/// Split Annex B data into raw NAL units (start codes stripped).
fn split_nal_units(annex_b: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut offset = 0;
    let mut starts = Vec::new();
    while offset + 4 <= annex_b.len() {
        if annex_b[offset..offset + 4] == START_CODE {
            starts.push(offset + 4);
            offset += 4;
        } else {
            offset += 1;
        }
    }
    for (i, &start) in starts.iter().enumerate() {
        let end = if i + 1 < starts.len() {
            starts[i + 1] - 4
        } else {
            annex_b.len()
        };
        if start < end {
            units.push(&annex_b[start..end]);
        }
    }
    units
}

/// Length-prefix a NAL unit (AVCC sample framing).
fn nal_to_avcc(nal: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
    out.extend_from_slice(nal);
}

struct ParameterSets {
    sps: Vec<u8>,
    pps: Vec<u8>,
}

/// Sort the first-frame NAL units into parameter sets and sample data.
fn scan_first_frame(annex_b: &[u8]) -> Result<(ParameterSets, Vec<u8>)> {
    let mut sps = None;
    let mut pps = None;
    let mut sample = Vec::new();
    for nal in split_nal_units(annex_b) {
        match nal[0] {
            0x67 => sps = Some(nal.to_vec()),
            0x68 => pps = Some(nal.to_vec()),
            _ => nal_to_avcc(nal, &mut sample),
        }
    }
    let sps = sps.ok_or_else(|| anyhow!("encoder emitted no SPS"))?;
    let pps = pps.ok_or_else(|| anyhow!("encoder emitted no PPS"))?;
    Ok((ParameterSets { sps, pps }, sample))
}

fn annex_b_to_avcc(annex_b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(annex_b.len() + 16);
    for nal in split_nal_units(annex_b) {
        nal_to_avcc(nal, &mut out);
    }
    out
}

fn start_mp4_writer(
    fd: File,
    params: &ParameterSets,
    display_width: u32,
    display_height: u32,
) -> Result<mp4::Mp4Writer<File>> {
    let mp4_config = mp4::Mp4Config {
        major_brand: str::parse("isom").unwrap(),
        minor_version: 512,
        compatible_brands: vec![
            str::parse("isom").unwrap(),
            str::parse("iso2").unwrap(),
            str::parse("avc1").unwrap(),
            str::parse("mp41").unwrap(),
        ],
        timescale: MOVIE_TIMESCALE,
    };
    let mut writer = mp4::Mp4Writer::write_start(fd, &mp4_config)?;
    let track_conf = mp4::TrackConfig {
        track_type: mp4::TrackType::Video,
        timescale: MOVIE_TIMESCALE,
        language: String::from("eng"),
        media_conf: mp4::MediaConfig::AvcConfig(mp4::AvcConfig {
            width: display_width
                .try_into()
                .map_err(|_| anyhow!("frame width {} exceeds container limit", display_width))?,
            height: display_height
                .try_into()
                .map_err(|_| anyhow!("frame height {} exceeds container limit", display_height))?,
            seq_param_set: params.sps.clone(),
            pic_param_set: params.pps.clone(),
        }),
    };
    writer.add_track(&track_conf)?;
    Ok(writer)
}

/// Encode a frame snapshot to an H.264/MP4 file at `fps`, sized to the
/// first frame's resolution.
pub fn write_clip(path: &Path, frames: &[FrameData], fps: u32) -> Result<()> {
    if frames.is_empty() {
        return Err(anyhow!("cannot encode an empty clip"));
    }
    if fps == 0 {
        return Err(anyhow!("fps must be positive"));
    }
    let first = &frames[0].image;
    let (width, height) = (first.width, first.height);
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot encode zero-sized frames"));
    }

    let sample_duration = MOVIE_TIMESCALE / fps;

    let i420 = convert_to_i420(first);
    let (nal_units, mut encoder) = less_avc::LessEncoder::new(&i420.as_ycbcr())
        .map_err(|e| anyhow!("H.264 encoder open failed: {}", e))?;
    let mut first_annex_b = Vec::new();
    for nal in nal_units.into_iter() {
        first_annex_b.extend(nal.to_annex_b_data());
    }
    let (params, first_sample) = scan_first_frame(&first_annex_b)?;

    let fd = File::create(path)
        .with_context(|| format!("failed to create clip file {}", path.display()))?;
    let mut writer = start_mp4_writer(fd, &params, width, height)?;

    let mut write_sample = |writer: &mut mp4::Mp4Writer<File>, idx: u64, avcc: Vec<u8>| {
        writer.write_sample(
            TRACK_ID,
            &mp4::Mp4Sample {
                start_time: idx * sample_duration as u64,
                duration: sample_duration,
                rendering_offset: 0,
                is_sync: true,
                bytes: avcc.into(),
            },
        )
    };

    write_sample(&mut writer, 0, first_sample)?;
    for (idx, frame) in frames.iter().enumerate().skip(1) {
        let image = &frame.image;
        // Later frames must match the clip resolution; skip stragglers.
        if image.width != width || image.height != height {
            log::warn!(
                "skipping {}x{} frame in a {}x{} clip",
                image.width,
                image.height,
                width,
                height
            );
            continue;
        }
        let i420 = convert_to_i420(image);
        let nal = encoder
            .encode(&i420.as_ycbcr())
            .map_err(|e| anyhow!("H.264 encode failed: {}", e))?;
        let avcc = annex_b_to_avcc(&nal.to_annex_b_data());
        write_sample(&mut writer, idx as u64, avcc)?;
    }

    writer.write_end()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn clip_frames(n: usize, width: u32, height: u32) -> Vec<FrameData> {
        (0..n)
            .map(|i| {
                let mut img = FrameImage::filled(width, height, [16, 16, 16]);
                img.fill_rect(i as i64, 4, 6, 10, [220, 220, 220]);
                FrameData {
                    timestamp: i as f64 / 15.0,
                    image: Arc::new(img),
                    bbox: None,
                }
            })
            .collect()
    }

    #[test]
    fn split_nal_units_strips_start_codes() {
        let mut data = Vec::new();
        data.extend_from_slice(&START_CODE);
        data.extend_from_slice(&[0x67, 1, 2]);
        data.extend_from_slice(&START_CODE);
        data.extend_from_slice(&[0x68, 3]);
        let units = split_nal_units(&data);
        assert_eq!(units, vec![&[0x67u8, 1, 2][..], &[0x68u8, 3][..]]);
    }

    #[test]
    fn avcc_framing_is_length_prefixed() {
        let mut data = Vec::new();
        data.extend_from_slice(&START_CODE);
        data.extend_from_slice(&[0x65, 9, 9, 9]);
        let avcc = annex_b_to_avcc(&data);
        assert_eq!(&avcc[..4], &[0, 0, 0, 4]);
        assert_eq!(&avcc[4..], &[0x65, 9, 9, 9]);
    }

    #[test]
    fn writes_a_playable_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let frames = clip_frames(8, 64, 48);
        write_clip(&path, &frames, 15).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);

        // The container must parse back with one video track.
        let file = File::open(&path).unwrap();
        let size = file.metadata().unwrap().len();
        let reader = mp4::Mp4Reader::read_header(file, size).unwrap();
        assert_eq!(reader.tracks().len(), 1);
    }

    #[test]
    fn rejects_empty_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        assert!(write_clip(&path, &[], 15).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn conversion_pads_to_macroblocks() {
        let img = FrameImage::filled(30, 18, [100, 150, 200]);
        let i420 = convert_to_i420(&img);
        assert_eq!(i420.padded_width, 32);
        assert_eq!(i420.padded_height, 32);
        assert_eq!(i420.y.len(), 32 * 32);
        assert_eq!(i420.u.len(), 16 * 16);
        assert_eq!(i420.v.len(), 16 * 16);
    }
}
