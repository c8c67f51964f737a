use crate::encode::encoder::EncoderOpts;
use crate::foundation::error::{PaintError, PaintResult};
use crate::pool::context::ContextOpts;
use crate::protocol::wire::MIN_ACTION_ROOM;
use crate::schedule::scheduler::DispatchPolicy;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding [`PipelineOpts::threads`].
pub const ENV_THREADS: &str = "PAINTPOOL_THREADS";
/// Environment variable overriding [`PipelineOpts::thread_timeout_ms`].
pub const ENV_THREAD_TIMEOUT_MS: &str = "PAINTPOOL_THREAD_TIMEOUT_MS";
/// Environment variable overriding [`PipelineOpts::segment_capacity`].
pub const ENV_SEGMENT_CAPACITY: &str = "PAINTPOOL_SEGMENT_CAPACITY";
/// Environment variable overriding [`PipelineOpts::font_path`].
pub const ENV_FONT: &str = "PAINTPOOL_FONT";

/// Configuration for one scheduler and its thread pool.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOpts {
    /// Number of render thread slots.
    pub threads: usize,
    /// Fixed byte capacity of one segment.
    pub segment_capacity: usize,
    /// Bytes kept free at the end of each segment; writes rotate before entering it.
    pub segment_margin: usize,
    /// A dispatched frame not answered within this many milliseconds faults its slot.
    pub thread_timeout_ms: u64,
    /// Which queued frame an idle thread picks next.
    pub dispatch_policy: DispatchPolicy,
    /// Evict registry images not referenced for this many commits. `None` keeps them forever.
    pub image_idle_commits: Option<u64>,
    /// Font file used for `fill_text`/`stroke_text`. Text draws are skipped without one.
    pub font_path: Option<PathBuf>,
    /// Color every canvas is cleared to on resize, straight RGBA8.
    pub clear_rgba: Option<[u8; 4]>,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            threads: 3,
            segment_capacity: 32 * 1024,
            segment_margin: 1024,
            thread_timeout_ms: 2000,
            dispatch_policy: DispatchPolicy::NewestFirst,
            image_idle_commits: None,
            font_path: None,
            clear_rgba: None,
        }
    }
}

impl PipelineOpts {
    /// Parse options from a JSON reader. Missing fields keep their defaults.
    pub fn from_reader<R: std::io::Read>(r: R) -> PaintResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| PaintError::config(format!("parse pipeline options JSON: {e}")))
    }

    /// Parse options from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> PaintResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            PaintError::config(format!("open pipeline options '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Apply `PAINTPOOL_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `PAINTPOOL_*` overrides read through `lookup`.
    ///
    /// Unparseable or out-of-range values are ignored and the current value is kept.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(ENV_THREADS)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            self.threads = n;
        }
        if let Some(ms) = lookup(ENV_THREAD_TIMEOUT_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
        {
            self.thread_timeout_ms = ms;
        }
        if let Some(cap) = lookup(ENV_SEGMENT_CAPACITY).and_then(|v| v.parse::<usize>().ok()) {
            self.segment_capacity = cap;
        }
        if let Some(font) = lookup(ENV_FONT).filter(|v| !v.is_empty()) {
            self.font_path = Some(PathBuf::from(font));
        }
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> PaintResult<()> {
        if self.threads == 0 {
            return Err(PaintError::config("threads must be > 0"));
        }
        if self.segment_margin == 0 {
            return Err(PaintError::config("segment_margin must be > 0"));
        }
        if self.segment_margin >= self.segment_capacity {
            return Err(PaintError::config(format!(
                "segment_margin ({}) must be smaller than segment_capacity ({})",
                self.segment_margin, self.segment_capacity
            )));
        }
        if self.segment_capacity - self.segment_margin < MIN_ACTION_ROOM {
            return Err(PaintError::config(format!(
                "segment_capacity minus segment_margin must leave at least {MIN_ACTION_ROOM} bytes"
            )));
        }
        if self.thread_timeout_ms == 0 {
            return Err(PaintError::config("thread_timeout_ms must be > 0"));
        }
        if self.image_idle_commits == Some(0) {
            return Err(PaintError::config("image_idle_commits must be > 0 when set"));
        }
        Ok(())
    }

    /// Timeout after which an unanswered dispatch faults its slot.
    pub fn thread_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_timeout_ms)
    }

    /// Segment sizing handed to every encoder.
    pub fn encoder_opts(&self) -> EncoderOpts {
        EncoderOpts {
            segment_capacity: self.segment_capacity,
            segment_margin: self.segment_margin,
        }
    }

    /// Options shared by every render context. Reads the font file when one is configured.
    pub fn context_opts(&self) -> PaintResult<ContextOpts> {
        let font = match &self.font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    PaintError::config(format!("read font '{}': {e}", path.display()))
                })?;
                Some(Arc::new(bytes))
            }
            None => None,
        };
        Ok(ContextOpts {
            font,
            clear_rgba: self.clear_rgba,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
