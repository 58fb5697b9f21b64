//! Consumers of dispatched samples.
//!
//! Sinks run synchronously on the sampling thread, in registration order, so
//! an `append` that stalls stalls acquisition. `LiveBuffer` only takes a short
//! lock; `CsvLogger` hands rows to its own writer thread and blocks only when
//! that thread falls a full queue behind.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use crossbeam_channel as xch;

use crate::layout::{Category, GroupedReadings, ScanLayout};

/// Samples retained by the live view unless configured otherwise.
pub const DEFAULT_LIVE_WINDOW: usize = 50;

/// Rows the CSV writer thread may lag behind before `append` blocks.
const LOG_QUEUE_DEPTH: usize = 1024;

/// One dispatched scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 1-based dispatch number within the session.
    pub seq: u64,
    /// Seconds since the session started.
    pub elapsed_s: f64,
    pub raw: GroupedReadings,
    /// Calibrated sting force; `None` unless the sting group has three channels.
    pub force: Option<[f64; 3]>,
}

pub trait SampleSink: Send {
    fn append(&mut self, sample: &Sample);

    /// Whether this sink can take samples shaped by `layout`. Sinks bound to
    /// a column layout (the CSV log) return false once bound to another one.
    fn accepts_layout(&self, _layout: &ScanLayout) -> bool {
        true
    }
}

impl<F: FnMut(&Sample) + Send> SampleSink for F {
    fn append(&mut self, sample: &Sample) {
        self(sample);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sliding window over the most recent samples.
pub struct LiveBuffer {
    window: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Read-only handle for consumers on other threads.
    pub fn view(&self) -> LiveView {
        LiveView {
            window: Arc::clone(&self.window),
            capacity: self.capacity,
        }
    }
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_WINDOW)
    }
}

impl SampleSink for LiveBuffer {
    fn append(&mut self, sample: &Sample) {
        let mut w = lock(&self.window);
        while w.len() >= self.capacity {
            w.pop_front();
        }
        w.push_back(sample.clone());
    }
}

#[derive(Clone)]
pub struct LiveView {
    window: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl LiveView {
    /// Copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        lock(&self.window).iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        lock(&self.window).back().cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.window).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `raw_data_<YYYYmmdd_HHMMSS>.csv`
pub fn log_file_name(at: DateTime<Local>) -> String {
    format!("raw_data_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// Header row for samples shaped like `raw`: elapsed time, then a
/// timestamp/value column pair per channel.
pub fn header(raw: &GroupedReadings) -> Vec<String> {
    let counts = raw.counts();
    let total: usize = counts.iter().map(|&(_, n)| n).sum();
    let mut cols = Vec::with_capacity(1 + 2 * total);
    cols.push("Elapsed_s".to_string());
    for (cat, n) in counts {
        for i in 1..=n {
            cols.push(format!("Timestamp_{cat}_{i}"));
            cols.push(format!("Channel_{cat}_{i}"));
        }
    }
    cols
}

fn row(sample: &Sample) -> Vec<f64> {
    let (values, timestamps) = sample.raw.flatten();
    let mut r = Vec::with_capacity(1 + 2 * values.len());
    r.push(sample.elapsed_s);
    for (ts, v) in timestamps.into_iter().zip(values) {
        r.push(ts);
        r.push(v);
    }
    r
}

enum LogLine {
    Header(Vec<String>),
    Row(Vec<f64>),
}

type Columns = [(Category, usize); 4];

/// Append-only CSV log written on a background thread.
///
/// The header is taken from the first sample, so it always matches the rows.
/// A log is bound to that shape: samples with a different channel layout are
/// not written, and `accepts_layout` lets the controller refuse such a
/// reconfiguration up front.
///
/// `append` never drops a sample of the bound shape: when the writer falls
/// behind by the full queue depth it blocks the caller until space frees up.
pub struct CsvLogger {
    path: PathBuf,
    tx: Option<xch::Sender<LogLine>>,
    join_handle: Option<JoinHandle<io::Result<u64>>>,
    columns: Option<Columns>,
    writer_gone: bool,
    shape_warned: bool,
}

impl CsvLogger {
    /// Create `dir/raw_data_<now>.csv`, creating `dir` if needed.
    pub fn in_dir(dir: &Path, flush_every: usize) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Self::create(&dir.join(log_file_name(Local::now())), flush_every)
    }

    pub fn create(path: &Path, flush_every: usize) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);

        let flush_every = flush_every.max(1);
        let (tx, rx) = xch::bounded::<LogLine>(LOG_QUEUE_DEPTH);
        let thread_path = path.to_path_buf();
        let join_handle = std::thread::Builder::new()
            .name("windbal-csv".into())
            .spawn(move || {
                let mut rows = 0u64;
                for line in rx {
                    match line {
                        LogLine::Header(cols) => {
                            wtr.write_record(&cols)?;
                            wtr.flush()?;
                        }
                        LogLine::Row(r) => {
                            wtr.write_record(r.iter().map(f64::to_string))?;
                            rows += 1;
                            if rows % flush_every as u64 == 0 {
                                wtr.flush()?;
                            }
                        }
                    }
                }
                wtr.flush()?;
                tracing::debug!(path = %thread_path.display(), rows, "sample log closed");
                Ok(rows)
            })?;

        tracing::info!(path = %path.display(), "sample log opened");
        Ok(Self {
            path: path.to_path_buf(),
            tx: Some(tx),
            join_handle: Some(join_handle),
            columns: None,
            writer_gone: false,
            shape_warned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the queue, wait for the writer, and report rows written.
    pub fn finish(mut self) -> io::Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> io::Result<u64> {
        drop(self.tx.take());
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("sample log writer panicked"))?,
            None => Ok(0),
        }
    }

    fn send(&mut self, line: LogLine) {
        let Some(tx) = &self.tx else { return };
        if tx.send(line).is_err() && !self.writer_gone {
            self.writer_gone = true;
            tracing::error!(path = %self.path.display(), "sample log writer stopped; further samples are not logged");
        }
    }
}

impl SampleSink for CsvLogger {
    fn append(&mut self, sample: &Sample) {
        let shape = sample.raw.counts();
        match self.columns {
            None => {
                self.columns = Some(shape);
                self.send(LogLine::Header(header(&sample.raw)));
            }
            Some(cols) if cols != shape => {
                if !self.shape_warned {
                    self.shape_warned = true;
                    tracing::error!(
                        path = %self.path.display(),
                        "channel layout differs from the sample log header; sample not logged"
                    );
                }
                return;
            }
            Some(_) => {}
        }
        self.send(LogLine::Row(row(sample)));
    }

    fn accepts_layout(&self, layout: &ScanLayout) -> bool {
        self.columns
            .is_none_or(|cols| cols.as_slice() == layout.counts())
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(path = %self.path.display(), error = %e, "sample log did not close cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Orientation;
    use crate::layout::{Category, ChannelGroup, ChannelSet};

    fn layout() -> ScanLayout {
        ChannelSet::new(vec![
            ChannelGroup::new(Category::Pressure, [101]),
            ChannelGroup::sting([301, 302], Orientation::Normal),
        ])
        .unwrap()
        .layout()
    }

    fn sample(seq: u64) -> Sample {
        let raw = layout()
            .split(
                &[seq as f64, 0.5, 0.25],
                &[1000.0 + seq as f64, 1000.5, 1000.75],
            )
            .unwrap();
        Sample {
            seq,
            elapsed_s: seq as f64 * 0.1,
            raw,
            force: None,
        }
    }

    #[test]
    fn live_buffer_evicts_oldest_at_capacity() {
        let mut buf = LiveBuffer::default();
        let view = buf.view();
        for i in 1..=60 {
            buf.append(&sample(i));
        }
        let snap = view.snapshot();
        assert_eq!(snap.len(), DEFAULT_LIVE_WINDOW);
        assert_eq!(snap.first().map(|s| s.seq), Some(11));
        assert_eq!(view.latest().map(|s| s.seq), Some(60));
    }

    #[test]
    fn snapshot_is_detached_from_buffer() {
        let mut buf = LiveBuffer::new(3);
        let view = buf.view();
        buf.append(&sample(1));
        let snap = view.snapshot();
        buf.append(&sample(2));
        assert_eq!(snap.len(), 1);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut buf = LiveBuffer::new(0);
        buf.append(&sample(1));
        buf.append(&sample(2));
        assert_eq!(buf.view().snapshot().len(), 1);
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |s: &Sample| seen.push(s.seq);
            sink.append(&sample(7));
        }
        assert_eq!(seen, vec![7]);
    }

    #[test]
    fn header_pairs_timestamp_and_value_per_channel() {
        assert_eq!(
            header(&sample(1).raw),
            vec![
                "Elapsed_s",
                "Timestamp_pressure_1",
                "Channel_pressure_1",
                "Timestamp_sting_1",
                "Channel_sting_1",
                "Timestamp_sting_2",
                "Channel_sting_2",
            ]
        );
    }

    #[test]
    fn log_file_name_uses_local_timestamp() {
        use chrono::TimeZone;
        let at = Local.with_ymd_and_hms(2024, 2, 18, 12, 30, 5).unwrap();
        assert_eq!(log_file_name(at), "raw_data_20240218_123005.csv");
    }

    #[test]
    fn csv_logger_writes_rows_in_scan_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLogger::create(&path, 2).unwrap();
        for i in 1..=3 {
            log.append(&sample(i));
        }
        assert_eq!(log.finish().unwrap(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Elapsed_s,Timestamp_pressure_1,Channel_pressure_1"));
        assert_eq!(lines[2], "0.2,1002,2,1000.5,0.5,1000.75,0.25");
    }

    #[test]
    fn header_comes_from_first_sample_and_binds_the_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLogger::create(&path, 10).unwrap();
        let narrower = ChannelSet::new(vec![ChannelGroup::sting([301, 302], Orientation::Normal)])
            .unwrap()
            .layout();
        assert!(log.accepts_layout(&narrower));

        log.append(&sample(1));
        assert!(log.accepts_layout(&layout()));
        assert!(!log.accepts_layout(&narrower));

        let other = Sample {
            seq: 2,
            elapsed_s: 0.2,
            raw: narrower.split(&[0.1, 0.2], &[1.0, 2.0]).unwrap(),
            force: None,
        };
        log.append(&other);
        log.append(&sample(3));
        assert_eq!(log.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let widths: Vec<usize> = text.lines().map(|l| l.split(',').count()).collect();
        assert_eq!(widths, vec![7, 7, 7]);
    }

    #[test]
    fn in_dir_creates_directory_and_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let log = CsvLogger::in_dir(&logs, 50).unwrap();
        let path = log.path().to_path_buf();
        drop(log);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("raw_data_") && name.ends_with(".csv"));
        assert!(path.exists());
    }
}
