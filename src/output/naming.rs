//! Output file naming.
//!
//! Final names look like
//! `2024.05.17_14.03.22.481_HW_1234567890_12ms.jpg`: local capture time,
//! timestamp provenance (`HW` from the source clock, `ERR` when
//! synthesized), hardware time in nanoseconds and measured encode latency.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::capture::Frame;

const TIME_FORMAT: &str = "%Y.%m.%d_%H.%M.%S%.3f";

/// Provenance tag of a frame's hardware timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    Hardware,
    Fallback,
}

impl TimeSource {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Hardware => "HW",
            Self::Fallback => "ERR",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "HW" => Some(Self::Hardware),
            "ERR" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Render milliseconds since epoch as `YYYY.MM.DD_HH.MM.SS.mmm` in `tz`.
pub fn format_capture_time<Tz>(ms: u64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match tz.timestamp_millis_opt(ms as i64).earliest() {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => format!("{}", ms),
    }
}

/// The part of the name known before encoding starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseName {
    pub capture_time: String,
    pub time_source: TimeSource,
    pub hardware_time_ns: u64,
}

impl BaseName {
    /// Base name for a frame, rendered in the local time zone.
    pub fn for_frame(frame: &Frame) -> Self {
        Self::for_frame_in(frame, &Local)
    }

    pub fn for_frame_in<Tz>(frame: &Frame, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self {
            capture_time: format_capture_time(frame.receive_time_ms, tz),
            time_source: if frame.hardware_time_valid {
                TimeSource::Hardware
            } else {
                TimeSource::Fallback
            },
            hardware_time_ns: frame.hardware_time_ns,
        }
    }

    /// Provisional path the encoder writes to. The sequence number keeps
    /// two frames with identical base names from sharing a temp file.
    pub fn temp_path(&self, dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!("{}.{}.part", self, sequence))
    }

    /// Path the frame becomes visible under once fully written.
    pub fn final_path(&self, dir: &Path, encode_ms: u64, ext: &str) -> PathBuf {
        dir.join(format!("{}_{}ms.{}", self, encode_ms, ext))
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.capture_time,
            self.time_source.tag(),
            self.hardware_time_ns
        )
    }
}

/// A parsed final output file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    pub capture_time: NaiveDateTime,
    pub time_source: TimeSource,
    pub hardware_time_ns: u64,
    pub encode_ms: u64,
    pub extension: String,
}

impl OutputName {
    /// Parse a final file name; temporary `.part` files and anything else
    /// not produced by the writer yield `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        if extension.is_empty() || extension == "part" {
            return None;
        }

        let mut parts = stem.split('_');
        let date = parts.next()?;
        let time = parts.next()?;
        let tag = parts.next()?;
        let hardware = parts.next()?;
        let latency = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let capture_time =
            NaiveDateTime::parse_from_str(&format!("{}_{}", date, time), TIME_FORMAT).ok()?;
        let encode_ms = latency.strip_suffix("ms")?.parse().ok()?;

        Some(Self {
            capture_time,
            time_source: TimeSource::from_tag(tag)?,
            hardware_time_ns: hardware.parse().ok()?,
            encode_ms,
            extension: extension.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::DecodedFrame;
    use chrono::Utc;

    // 2024-05-17T14:03:22.481Z
    const MS: u64 = 1_715_954_602_481;

    fn frame(pts_ns: Option<u64>) -> Frame {
        Frame::stamp(
            DecodedFrame {
                rgb: vec![0; 3],
                width: 1,
                height: 1,
                pts_ns,
            },
            0,
            MS,
        )
    }

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_capture_time(MS, &Utc), "2024.05.17_14.03.22.481");
        assert_eq!(format_capture_time(5, &Utc), "1970.01.01_00.00.00.005");
    }

    #[test]
    fn valid_pts_is_tagged_hw() {
        let name = BaseName::for_frame_in(&frame(Some(987_654_321)), &Utc);
        assert_eq!(name.to_string(), "2024.05.17_14.03.22.481_HW_987654321");
    }

    #[test]
    fn fallback_time_is_tagged_err() {
        let name = BaseName::for_frame_in(&frame(None), &Utc);
        assert_eq!(
            name.to_string(),
            "2024.05.17_14.03.22.481_ERR_1715954602481000000"
        );
    }

    #[test]
    fn temp_and_final_paths() {
        let name = BaseName::for_frame_in(&frame(Some(1)), &Utc);
        let dir = Path::new("/data/out");
        assert_eq!(
            name.temp_path(dir, 42),
            PathBuf::from("/data/out/2024.05.17_14.03.22.481_HW_1.42.part")
        );
        assert_eq!(
            name.final_path(dir, 17, "jpg"),
            PathBuf::from("/data/out/2024.05.17_14.03.22.481_HW_1_17ms.jpg")
        );
    }

    #[test]
    fn parses_final_name() {
        let parsed = OutputName::parse("2024.05.17_14.03.22.481_ERR_1715954602481000000_9ms.png")
            .unwrap();
        assert_eq!(parsed.time_source, TimeSource::Fallback);
        assert_eq!(parsed.hardware_time_ns, 1_715_954_602_481_000_000);
        assert_eq!(parsed.encode_ms, 9);
        assert_eq!(parsed.extension, "png");
        assert_eq!(
            parsed.capture_time.format(TIME_FORMAT).to_string(),
            "2024.05.17_14.03.22.481"
        );
    }

    #[test]
    fn rejects_foreign_and_partial_names() {
        assert!(OutputName::parse("2024.05.17_14.03.22.481_HW_1.42.part").is_none());
        assert!(OutputName::parse("holiday.jpg").is_none());
        assert!(OutputName::parse("2024.05.17_14.03.22.481_XX_1_3ms.jpg").is_none());
        assert!(OutputName::parse("2024.05.17_14.03.22.481_HW_1_3.jpg").is_none());
    }
}
