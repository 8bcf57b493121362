//! Consumer side: encode queued frames and publish them with a two-phase
//! write.
//!
//! The encoder writes to `{base}.{sequence}.part`; once it finishes, the
//! file is moved to `{base}_{encode_ms}ms.{ext}`. A file only ever appears
//! under its final name fully written, and the name carries the latency
//! that could not be known before encoding started. An existing final file
//! is never replaced; the colliding frame fails with [`WriteError::Exists`].

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, trace, warn};

use super::Shared;
use crate::capture::Frame;
use crate::error::{ErrorKind, WriteError};
use crate::output::{BaseName, ImageEncoder};

#[derive(Debug, Clone)]
pub(crate) struct WriterSettings {
    pub directory: PathBuf,
    pub quality: u8,
    pub pop_timeout: Duration,
}

pub(crate) struct WriteStage {
    id: usize,
    shared: Arc<Shared>,
    encoder: Arc<dyn ImageEncoder>,
    settings: Arc<WriterSettings>,
}

impl WriteStage {
    pub(crate) fn new(
        id: usize,
        shared: Arc<Shared>,
        encoder: Arc<dyn ImageEncoder>,
        settings: Arc<WriterSettings>,
    ) -> Self {
        Self {
            id,
            shared,
            encoder,
            settings,
        }
    }

    /// Loop until a stop is requested and the queue has drained.
    #[instrument(name = "writer", skip_all, fields(id = self.id))]
    pub(crate) fn run(self) {
        let mut written = 0u64;

        loop {
            if self.shared.stop_requested() && self.shared.queue.is_empty() {
                break;
            }
            let Some(frame) = self.shared.queue.pop(self.settings.pop_timeout) else {
                continue;
            };

            match persist(
                &frame,
                self.encoder.as_ref(),
                &self.settings.directory,
                self.settings.quality,
            ) {
                Ok(path) => {
                    self.shared.stats.record_written();
                    written += 1;
                    trace!(
                        sequence = frame.sequence,
                        bytes = frame.byte_len(),
                        path = %path.display(),
                        "frame written"
                    );
                }
                Err(err) => {
                    self.shared
                        .reporter
                        .report(ErrorKind::WriteError, err.to_string(), false);
                }
            }
        }

        info!("Write thread exiting (wrote {} frames)", written);
    }
}

/// Encode `frame` into `dir` and return its final path.
pub(crate) fn persist(
    frame: &Frame,
    encoder: &dyn ImageEncoder,
    dir: &Path,
    quality: u8,
) -> Result<PathBuf, WriteError> {
    let base = BaseName::for_frame(frame);
    let ext = encoder.extension();
    let temp = base.temp_path(dir, frame.sequence);

    let started = Instant::now();
    if let Err(err) = encode_to(&temp, frame, encoder, quality) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    let encode_ms = started.elapsed().as_millis() as u64;
    metrics::histogram!("framesink_encode_ms").record(encode_ms as f64);

    let final_path = base.final_path(dir, encode_ms, ext);
    if let Err(err) = publish(&temp, &final_path) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    Ok(final_path)
}

/// Move `temp` to `final_path` without ever replacing an existing file.
fn publish(temp: &Path, final_path: &Path) -> Result<(), WriteError> {
    match fs::hard_link(temp, final_path) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(temp) {
                warn!(path = %temp.display(), "failed to remove temporary file: {}", err);
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(WriteError::Exists(final_path.to_path_buf()))
        }
        // Filesystems without hard links (FAT, some network mounts).
        Err(_) => {
            if final_path.exists() {
                return Err(WriteError::Exists(final_path.to_path_buf()));
            }
            fs::rename(temp, final_path).map_err(|source| WriteError::Rename {
                from: temp.to_path_buf(),
                to: final_path.to_path_buf(),
                source,
            })
        }
    }
}

fn encode_to(
    path: &Path,
    frame: &Frame,
    encoder: &dyn ImageEncoder,
    quality: u8,
) -> Result<(), WriteError> {
    let persist_err = |source| WriteError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(persist_err)?;
    let mut out = BufWriter::new(file);
    encoder.encode(&frame.pixels, frame.width, frame.height, quality, &mut out)?;
    out.flush().map_err(persist_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::DecodedFrame;
    use crate::output::{JpegEncoder, OutputName, TimeSource};

    fn frame(pts_ns: Option<u64>, rgb: Vec<u8>) -> Frame {
        Frame::stamp(
            DecodedFrame {
                rgb,
                width: 4,
                height: 2,
                pts_ns,
            },
            3,
            1_715_954_602_481,
        )
    }

    #[test]
    fn persists_under_final_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = persist(&frame(Some(1234), vec![90; 24]), &JpegEncoder, tmp.path(), 85)
            .unwrap();

        assert!(path.is_file());
        let name = path.file_name().unwrap().to_str().unwrap();
        let parsed = OutputName::parse(name).unwrap();
        assert_eq!(parsed.time_source, TimeSource::Hardware);
        assert_eq!(parsed.hardware_time_ns, 1234);
        assert_eq!(parsed.extension, "jpg");

        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary file left behind");
    }

    #[test]
    fn fallback_timestamp_is_tagged_err() {
        let tmp = tempfile::tempdir().unwrap();
        let path = persist(&frame(None, vec![0; 24]), &JpegEncoder, tmp.path(), 85).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.contains("_ERR_1715954602481000000_"));
    }

    #[test]
    fn encode_failure_leaves_no_files() {
        let tmp = tempfile::tempdir().unwrap();
        let err = persist(&frame(Some(1), vec![0; 5]), &JpegEncoder, tmp.path(), 85).unwrap_err();
        assert!(matches!(err, WriteError::Encode { .. }));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_directory_is_a_persist_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = persist(
            &frame(Some(1), vec![0; 24]),
            &JpegEncoder,
            &tmp.path().join("gone"),
            85,
        )
        .unwrap_err();
        assert!(matches!(err, WriteError::Persist { .. }));
    }

    #[test]
    fn same_millisecond_fallback_frames_never_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let stamp = |sequence| {
            Frame::stamp(
                DecodedFrame {
                    rgb: vec![40; 2 * 2 * 3],
                    width: 2,
                    height: 2,
                    pts_ns: None,
                },
                sequence,
                1_715_954_602_481,
            )
        };

        let mut published = 0;
        let mut collisions = 0;
        // Identical base names; only the encode latency can tell the final
        // names apart, and tiny frames encode in the same millisecond.
        for sequence in 0..20 {
            match persist(&stamp(sequence), &JpegEncoder, tmp.path(), 85) {
                Ok(_) => published += 1,
                Err(WriteError::Exists(path)) => {
                    assert!(path.is_file());
                    collisions += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let on_disk: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(on_disk.len(), published, "every success is its own file");
        assert!(collisions > 0);
        assert_eq!(published + collisions, 20);
    }

    #[test]
    fn publish_refuses_existing_target() {
        let tmp = tempfile::tempdir().unwrap();
        let temp = tmp.path().join("frame.7.part");
        let target = tmp.path().join("frame_3ms.jpg");
        fs::write(&temp, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        let err = publish(&temp, &target).unwrap_err();
        assert!(matches!(err, WriteError::Exists(_)));
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }
}
