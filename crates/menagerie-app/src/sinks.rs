use std::io::Write;

use menagerie_core::{RenderFrame, RenderSink};
use tracing::{debug, trace, warn};

/// Emits each frame as tracing events; handy with `RUST_LOG=menagerie_app=debug`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl RenderSink for TracingSink {
    fn present(&mut self, frame: &RenderFrame) {
        let visible = frame.sprites.iter().filter(|sprite| sprite.visible).count();
        debug!(
            tick = frame.tick,
            timestamp = frame.timestamp,
            sprites = frame.sprites.len(),
            visible,
            "frame"
        );
        for sprite in &frame.sprites {
            trace!(
                tick = frame.tick,
                name = %sprite.name,
                x = sprite.x,
                y = sprite.y,
                size = sprite.width,
                rotation = sprite.rotation_degrees,
                visible = sprite.visible,
                "sprite"
            );
        }
    }
}

/// Writes one JSON object per frame. Stops writing after the first I/O error.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
    failed: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            failed: false,
        }
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    fn write_frame(&mut self, frame: &RenderFrame) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> RenderSink for JsonLinesSink<W> {
    fn present(&mut self, frame: &RenderFrame) {
        if self.failed {
            return;
        }
        match self.write_frame(frame) {
            Ok(()) => self.written += 1,
            Err(err) => {
                warn!(%err, tick = frame.tick, "failed to write frame; disabling output");
                self.failed = true;
            }
        }
    }
}

impl<W: Write> Drop for JsonLinesSink<W> {
    fn drop(&mut self) {
        if !self.failed
            && let Err(err) = self.writer.flush()
        {
            warn!(%err, "failed to flush frame output");
        }
    }
}
