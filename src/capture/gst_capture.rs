//! GStreamer-based RTSP ingest with hardware-clock presentation timestamps

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, instrument};

use crate::capture::frame::DecodedFrame;
use crate::capture::source::{FrameSource, TransportOptions};
use crate::error::CaptureError;

const PULL_TIMEOUT_MS: u64 = 200;
const PREROLL_TIMEOUT_SECS: u64 = 5;

/// RTSP camera decoded to packed RGB through a GStreamer pipeline
pub struct GstRtspSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    url: String,
}

impl GstRtspSource {
    /// Build the pipeline and bring it to PLAYING; failures here are fatal
    pub fn open(url: &str, options: &TransportOptions) -> Result<Self, CaptureError> {
        let connection = |reason: String| CaptureError::Connection {
            address: url.to_string(),
            reason,
        };

        gst::init().map_err(|e| connection(format!("failed to initialize GStreamer: {}", e)))?;

        let pipeline_str = Self::build_pipeline_string(url, options);
        info!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| CaptureError::Codec(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Codec("failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| CaptureError::Codec("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Codec("failed to cast to AppSink".into()))?;

        // Backpressure is the recorder's job: keep a short buffer and never
        // sync to the clock.
        appsink.set_property("emit-signals", false);
        appsink.set_property("max-buffers", 3u32);
        appsink.set_property("drop", false);
        appsink.set_property("sync", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| connection(format!("failed to start pipeline: {:?}", e)))?;

        let (state_change, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(
            PREROLL_TIMEOUT_SECS,
        )));
        if state_change.is_err() {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(connection(Self::bus_error(&pipeline).unwrap_or_else(|| {
                "pipeline failed to reach PLAYING".to_string()
            })));
        }

        info!("Connected to RTSP stream: {}", url);
        Ok(Self {
            pipeline,
            appsink,
            url: url.to_string(),
        })
    }

    fn build_pipeline_string(url: &str, options: &TransportOptions) -> String {
        let protocols = if options.reliable { "tcp" } else { "udp" };
        format!(
            "rtspsrc location=\"{}\" protocols={} latency={} ! \
             decodebin ! \
             videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=appsink",
            url, protocols, options.max_delay_ms
        )
    }

    fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
        let bus = pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

impl FrameSource for GstRtspSource {
    #[instrument(skip(self), level = "trace")]
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError> {
        if let Some(reason) = Self::bus_error(&self.pipeline) {
            return Err(CaptureError::Connection {
                address: self.url.clone(),
                reason,
            });
        }

        let Some(sample) = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        else {
            if self.appsink.is_eos() {
                return Err(CaptureError::EndOfStream);
            }
            return Ok(None);
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Read("sample contains no buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Decode("sample has no caps".into()))?;
        let video_info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| CaptureError::Decode("failed to parse video info from caps".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::Read("failed to map buffer".into()))?;

        let (width, height) = (video_info.width(), video_info.height());
        let row = width as usize * 3;
        let stride = video_info.stride()[0] as usize;
        let data = map.as_slice();
        if height == 0 || stride < row || data.len() < stride * (height as usize - 1) + row {
            return Err(CaptureError::Decode(format!(
                "buffer of {} bytes too small for {}x{} stride {}",
                data.len(),
                width,
                height,
                stride
            )));
        }

        // RGB rows may be padded; copy into a tightly packed buffer.
        let rgb = if stride == row {
            data[..row * height as usize].to_vec()
        } else {
            let mut rgb = Vec::with_capacity(row * height as usize);
            for line in data.chunks(stride).take(height as usize) {
                rgb.extend_from_slice(&line[..row]);
            }
            rgb
        };

        Ok(Some(DecodedFrame {
            rgb,
            width,
            height,
            pts_ns: buffer.pts().map(|pts| pts.nseconds()),
        }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

impl Drop for GstRtspSource {
    fn drop(&mut self) {
        debug!("Stopping GStreamer pipeline for {}", self.url);
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
