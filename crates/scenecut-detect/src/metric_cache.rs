//! Per-frame metric cache with CSV persistence.
//!
//! Detectors store the numbers they compute per frame here so a second run
//! over the same video (or a resumed run) can skip the expensive image
//! work. Every metric column is owned by exactly one detector; ownership is
//! checked once at registration, so writes need no locking.
//!
//! Format:
//! ```text
//! Scenecut Metrics,1,Frame Rate:,25.0000000000
//! Frame Number,content_val,delta_hue,delta_sat,delta_lum
//! 1,12.5,3,4.25,30.25
//! 2,0.5,None,None,None
//! ```
//!
//! Missing values are written as `None`. Saving goes through a temporary
//! file in the destination directory that is renamed over the target, so a
//! crash never leaves a truncated cache behind.

use crate::error::{DetectError, DetectResult};
use scenecut_core::FrameRate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const MARKER: &str = "Scenecut Metrics";
const SCHEMA_VERSION: &str = "1";
const COLUMN_FRAME_RATE: &str = "Frame Rate:";
const COLUMN_FRAME_NUMBER: &str = "Frame Number";
const NO_VALUE: &str = "None";

/// Frame index to named metric values.
#[derive(Debug, Clone, Default)]
pub struct MetricCache {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    /// Owner label per column; `None` for columns loaded but not yet claimed.
    owners: Vec<Option<String>>,
    frames: BTreeMap<u64, Vec<Option<f64>>>,
    loaded_rate: Option<FrameRate>,
    dirty: bool,
}

impl MetricCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `metrics` for `owner`.
    ///
    /// All-or-nothing: if any metric is owned by someone else nothing is
    /// registered. Registering a metric the owner already holds is a no-op.
    pub fn register(&mut self, owner: &str, metrics: &[impl AsRef<str>]) -> DetectResult<()> {
        for metric in metrics {
            let metric = metric.as_ref();
            validate_metric_name(metric)?;
            if let Some(current) = self.owner_of(metric) {
                if current != owner {
                    return Err(DetectError::MetricCollision {
                        metric: metric.to_string(),
                        owner: current.to_string(),
                    });
                }
            }
        }
        for metric in metrics {
            let index = self.column_or_insert(metric.as_ref());
            self.owners[index] = Some(owner.to_string());
        }
        debug!(owner, metrics = metrics.len(), "Registered metrics");
        Ok(())
    }

    /// Drop `owner`'s claim on all of its metrics. Stored values are kept.
    pub fn release(&mut self, owner: &str) {
        for slot in &mut self.owners {
            if slot.as_deref() == Some(owner) {
                *slot = None;
            }
        }
    }

    /// Explicitly re-register an owned metric, discarding every stored value
    /// so it can be recomputed.
    pub fn reregister(&mut self, owner: &str, metric: &str) -> DetectResult<()> {
        let index = self.owned_column(owner, metric)?;
        let mut cleared = 0usize;
        for values in self.frames.values_mut() {
            if let Some(slot) = values.get_mut(index) {
                if slot.take().is_some() {
                    cleared += 1;
                }
            }
        }
        self.frames.retain(|_, values| values.iter().any(Option::is_some));
        if cleared > 0 {
            self.dirty = true;
        }
        debug!(owner, metric, cleared, "Re-registered metric");
        Ok(())
    }

    /// Owner label of `metric`, if it is registered.
    pub fn owner_of(&self, metric: &str) -> Option<&str> {
        let index = *self.column_index.get(metric)?;
        self.owners[index].as_deref()
    }

    /// Whether a value is stored for (`frame`, `metric`).
    pub fn has(&self, frame: u64, metric: &str) -> bool {
        self.get(frame, metric).is_some()
    }

    /// Whether values are stored for every metric at `frame`.
    pub fn has_all(&self, frame: u64, metrics: &[impl AsRef<str>]) -> bool {
        metrics.iter().all(|m| self.has(frame, m.as_ref()))
    }

    /// Stored value for (`frame`, `metric`).
    pub fn get(&self, frame: u64, metric: &str) -> Option<f64> {
        let index = *self.column_index.get(metric)?;
        self.frames.get(&frame)?.get(index).copied().flatten()
    }

    /// Store a value for a registered metric.
    ///
    /// Writing the value already stored is a no-op; writing a different
    /// one fails with [`DetectError::MetricOverwrite`].
    pub fn put(&mut self, frame: u64, metric: &str, value: f64) -> DetectResult<()> {
        let index = match self.column_index.get(metric) {
            Some(&index) if self.owners[index].is_some() => index,
            _ => return Err(DetectError::MetricNotRegistered(metric.to_string())),
        };
        self.store(index, frame, metric, value)
    }

    /// A view restricted to the metrics owned by `owner`.
    pub fn scope<'a>(&'a mut self, owner: &'a str) -> MetricScope<'a> {
        MetricScope { cache: self, owner }
    }

    /// Number of frames with at least one stored value.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Whether no values are stored.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame rate recorded in the last loaded file.
    pub fn loaded_frame_rate(&self) -> Option<FrameRate> {
        self.loaded_rate
    }

    /// Whether values were added since the last save or load.
    pub fn is_save_required(&self) -> bool {
        self.dirty
    }

    /// Atomically write the cache to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>, rate: FrameRate) -> DetectResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            self.write_to(&mut writer, rate)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        self.dirty = false;
        info!(
            path = %path.display(),
            frames = self.frames.len(),
            metrics = self.columns.len(),
            "Saved metric cache"
        );
        Ok(())
    }

    /// Write the cache in CSV form.
    pub fn write_to(&self, mut writer: impl Write, rate: FrameRate) -> DetectResult<()> {
        writeln!(
            writer,
            "{MARKER},{SCHEMA_VERSION},{COLUMN_FRAME_RATE},{:.10}",
            rate.fps()
        )?;
        write!(writer, "{COLUMN_FRAME_NUMBER}")?;
        for column in &self.columns {
            write!(writer, ",{column}")?;
        }
        writeln!(writer)?;

        for (frame, values) in &self.frames {
            write!(writer, "{frame}")?;
            for index in 0..self.columns.len() {
                match values.get(index).copied().flatten() {
                    Some(value) => write!(writer, ",{value}")?,
                    None => write!(writer, ",{NO_VALUE}")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Load and merge a cache file, returning the number of frame rows.
    ///
    /// When `expected_rate` is given the file must have been written at
    /// that rate. On any error the cache is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>, expected_rate: Option<FrameRate>) -> DetectResult<usize> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let rows = self.read_from(BufReader::new(file), expected_rate)?;
        info!(path = %path.display(), rows, "Loaded metric cache");
        Ok(rows)
    }

    /// Validate and merge CSV data from `reader`.
    pub fn read_from(&mut self, reader: impl BufRead, expected_rate: Option<FrameRate>) -> DetectResult<usize> {
        let Some(parsed) = ParsedCache::parse(reader)? else {
            return Ok(0);
        };
        if let Some(expected) = expected_rate {
            if !expected.approx_eq(parsed.rate) {
                return Err(DetectError::CacheFrameRateMismatch {
                    expected: expected.fps(),
                    found: parsed.rate.fps(),
                });
            }
        }

        // Validate against stored values before touching anything.
        for (frame, values) in &parsed.rows {
            for (metric, value) in parsed.columns.iter().zip(values) {
                if let (Some(value), Some(existing)) = (value, self.get(*frame, metric)) {
                    if existing != *value {
                        return Err(DetectError::MetricOverwrite {
                            frame: *frame,
                            metric: metric.clone(),
                            existing,
                            value: *value,
                        });
                    }
                }
            }
        }

        let was_empty = self.frames.is_empty();
        let indices: Vec<usize> = parsed
            .columns
            .iter()
            .map(|metric| self.column_or_insert(metric))
            .collect();
        let rows = parsed.rows.len();
        for (frame, values) in parsed.rows {
            for (&index, value) in indices.iter().zip(values) {
                if let Some(value) = value {
                    *self.slot(frame, index) = Some(value);
                }
            }
        }
        self.loaded_rate = Some(parsed.rate);
        if was_empty {
            self.dirty = false;
        }
        Ok(rows)
    }

    fn store(&mut self, index: usize, frame: u64, metric: &str, value: f64) -> DetectResult<()> {
        if !value.is_finite() {
            return Err(DetectError::invalid_parameter(format!(
                "metric {metric} at frame {frame} is not finite ({value})"
            )));
        }
        let slot = self.slot(frame, index);
        match *slot {
            Some(existing) if existing == value => Ok(()),
            Some(existing) => Err(DetectError::MetricOverwrite {
                frame,
                metric: metric.to_string(),
                existing,
                value,
            }),
            None => {
                *slot = Some(value);
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn slot(&mut self, frame: u64, index: usize) -> &mut Option<f64> {
        let values = self.frames.entry(frame).or_default();
        if values.len() <= index {
            values.resize(index + 1, None);
        }
        &mut values[index]
    }

    fn column_or_insert(&mut self, metric: &str) -> usize {
        if let Some(&index) = self.column_index.get(metric) {
            return index;
        }
        let index = self.columns.len();
        self.columns.push(metric.to_string());
        self.owners.push(None);
        self.column_index.insert(metric.to_string(), index);
        index
    }

    fn owned_column(&self, owner: &str, metric: &str) -> DetectResult<usize> {
        match self.column_index.get(metric) {
            Some(&index) if self.owners[index].as_deref() == Some(owner) => Ok(index),
            Some(&index) => match &self.owners[index] {
                Some(other) => Err(DetectError::MetricCollision {
                    metric: metric.to_string(),
                    owner: other.clone(),
                }),
                None => Err(DetectError::MetricNotRegistered(metric.to_string())),
            },
            None => Err(DetectError::MetricNotRegistered(metric.to_string())),
        }
    }
}

/// The part of a [`MetricCache`] one detector may touch.
pub struct MetricScope<'a> {
    cache: &'a mut MetricCache,
    owner: &'a str,
}

impl MetricScope<'_> {
    /// Owner label of this scope.
    pub fn owner(&self) -> &str {
        self.owner
    }

    /// Stored value of one of this owner's metrics.
    pub fn get(&self, frame: u64, metric: &str) -> Option<f64> {
        if self.cache.owner_of(metric) == Some(self.owner) {
            self.cache.get(frame, metric)
        } else {
            None
        }
    }

    /// Whether a value is stored for (`frame`, `metric`).
    pub fn has(&self, frame: u64, metric: &str) -> bool {
        self.get(frame, metric).is_some()
    }

    /// Whether values are stored for every metric at `frame`.
    pub fn has_all(&self, frame: u64, metrics: &[impl AsRef<str>]) -> bool {
        metrics.iter().all(|m| self.has(frame, m.as_ref()))
    }

    /// Store a value for one of this owner's metrics.
    pub fn put(&mut self, frame: u64, metric: &str, value: f64) -> DetectResult<()> {
        let index = self.cache.owned_column(self.owner, metric)?;
        self.cache.store(index, frame, metric, value)
    }
}

fn validate_metric_name(metric: &str) -> DetectResult<()> {
    if metric.is_empty() || metric == COLUMN_FRAME_NUMBER {
        return Err(DetectError::invalid_parameter(format!(
            "invalid metric name {metric:?}"
        )));
    }
    if metric.contains([',', '"', '\r', '\n']) {
        return Err(DetectError::invalid_parameter(format!(
            "metric name {metric:?} contains a reserved character"
        )));
    }
    Ok(())
}

struct ParsedCache {
    rate: FrameRate,
    columns: Vec<String>,
    rows: Vec<(u64, Vec<Option<f64>>)>,
}

impl ParsedCache {
    /// Parse a whole file. `None` for empty input.
    fn parse(reader: impl BufRead) -> DetectResult<Option<Self>> {
        let mut text = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => DetectError::corrupt(i + 1, "not valid UTF-8"),
                _ => DetectError::Io(e),
            })?;
            text.push((i + 1, line));
        }
        if text.iter().all(|(_, line)| line.trim().is_empty()) {
            return Ok(None);
        }
        let mut lines = text.into_iter();

        let Some((line_no, first)) = lines.next() else {
            return Ok(None);
        };
        let rate = parse_header(line_no, &first)?;

        let (line_no, second) = lines
            .next()
            .ok_or_else(|| DetectError::corrupt(line_no + 1, "column header row missing"))?;
        let columns = parse_columns(line_no, &second)?;

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for (line_no, line) in lines {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != columns.len() + 1 {
                return Err(DetectError::corrupt(
                    line_no,
                    format!("expected {} fields, found {}", columns.len() + 1, fields.len()),
                ));
            }
            let frame: u64 = fields[0]
                .trim()
                .parse()
                .map_err(|_| DetectError::corrupt(line_no, format!("bad frame number {:?}", fields[0])))?;
            if !seen.insert(frame) {
                return Err(DetectError::corrupt(line_no, format!("duplicate frame {frame}")));
            }
            let values = fields[1..]
                .iter()
                .map(|field| parse_value(line_no, field))
                .collect::<DetectResult<Vec<_>>>()?;
            rows.push((frame, values));
        }

        Ok(Some(Self {
            rate,
            columns,
            rows,
        }))
    }
}

fn parse_header(line_no: usize, line: &str) -> DetectResult<FrameRate> {
    let fields: Vec<&str> = line.split(',').collect();
    let [marker, version, label, fps] = fields[..] else {
        return Err(DetectError::corrupt(line_no, "malformed header row"));
    };
    if marker != MARKER || label != COLUMN_FRAME_RATE {
        return Err(DetectError::corrupt(line_no, "not a scenecut metric cache"));
    }
    if version != SCHEMA_VERSION {
        return Err(DetectError::corrupt(
            line_no,
            format!("unsupported schema version {version:?}"),
        ));
    }
    let fps: f64 = fps
        .trim()
        .parse()
        .map_err(|_| DetectError::corrupt(line_no, format!("bad frame rate {fps:?}")))?;
    FrameRate::new(fps).map_err(|e| DetectError::corrupt(line_no, e.to_string()))
}

fn parse_columns(line_no: usize, line: &str) -> DetectResult<Vec<String>> {
    let mut fields = line.split(',');
    if fields.next() != Some(COLUMN_FRAME_NUMBER) {
        return Err(DetectError::corrupt(line_no, "first column must be the frame number"));
    }
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for name in fields {
        if validate_metric_name(name).is_err() {
            return Err(DetectError::corrupt(line_no, format!("invalid metric name {name:?}")));
        }
        if !seen.insert(name) {
            return Err(DetectError::corrupt(line_no, format!("duplicate metric {name:?}")));
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

fn parse_value(line_no: usize, field: &str) -> DetectResult<Option<f64>> {
    let field = field.trim();
    if field.is_empty() || field == NO_VALUE {
        return Ok(None);
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(DetectError::corrupt(line_no, format!("bad metric value {field:?}"))),
    }
}
