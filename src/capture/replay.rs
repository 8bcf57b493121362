//! Directory replay (`file://<dir>`): JPEG files played back as an MJPEG
//! stream in file-name order.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::info;

use super::frame::CompressedUnit;
use super::source::PacketSource;
use super::Pacer;
use crate::error::CaptureError;

pub struct DirectoryPackets {
    files: Vec<PathBuf>,
    next: usize,
    pacer: Pacer,
}

impl DirectoryPackets {
    pub fn open(dir: &Path, fps: u32) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CaptureError::Connection {
            address: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_jpeg(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::NoVideoStream(dir.display().to_string()));
        }

        info!("Replaying {} JPEG files from {}", files.len(), dir.display());
        Ok(Self {
            files,
            next: 0,
            pacer: Pacer::new(fps.max(1)),
        })
    }
}

impl PacketSource for DirectoryPackets {
    fn read_unit(&mut self) -> Result<CompressedUnit, CaptureError> {
        let Some(path) = self.files.get(self.next) else {
            return Err(CaptureError::EndOfStream);
        };
        let index = self.next as u64;
        self.next += 1;

        let data = std::fs::read(path)
            .map_err(|e| CaptureError::Read(format!("{}: {}", path.display(), e)))?;
        self.pacer.wait();

        Ok(CompressedUnit {
            data: Bytes::from(data),
            pts_ns: Some(self.pacer.pts_ns(index)),
        })
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}
