//! Event sources for the merger
//!
//! This module provides:
//! - `EventSource`: one acquisition cycle per call, `None` when exhausted
//! - `FileListSource`: flat timeframe dumps named in a file list
//! - `EventQueue`: in-memory events

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::common::{RawEvent, TimeframeResult};
use crate::recorder::read_timeframe;

/// Supplier of raw acquisition cycles
///
/// `Ok(None)` marks the normal end of input, `Err` a failure that aborts the
/// run.
pub trait EventSource {
    fn next_event(&mut self) -> TimeframeResult<Option<RawEvent>>;
}

/// Events held in memory
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: VecDeque<RawEvent>,
}

impl EventQueue {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn push(&mut self, event: RawEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for EventQueue {
    fn next_event(&mut self) -> TimeframeResult<Option<RawEvent>> {
        Ok(self.events.pop_front())
    }
}

/// Reads input file names, one per line, and parses each named flat dump as
/// one acquisition cycle
///
/// Blank lines and lines starting with `#` are skipped. Relative names are
/// resolved against `base_dir` when one is set.
pub struct FileListSource<R> {
    list: R,
    base_dir: Option<PathBuf>,
    files_read: usize,
}

impl FileListSource<BufReader<File>> {
    /// Open a file list; relative entries are resolved against its directory
    pub fn open<P: AsRef<Path>>(path: P) -> TimeframeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            error!(file = %path.display(), error = %e, "Cannot open input file list");
            e
        })?;
        info!(file = %path.display(), "Reading input file names");
        let base_dir = path.parent().map(Path::to_path_buf);
        Ok(Self::new(BufReader::new(file)).with_base_dir(base_dir))
    }
}

impl<R: BufRead> FileListSource<R> {
    pub fn new(list: R) -> Self {
        Self {
            list,
            base_dir: None,
            files_read: 0,
        }
    }

    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn files_read(&self) -> usize {
        self.files_read
    }

    /// Next file name of the list
    fn next_file(&mut self) -> TimeframeResult<Option<PathBuf>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.list.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let name = line.trim();
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            let path = PathBuf::from(name);
            let path = match &self.base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
            return Ok(Some(path));
        }
    }
}

impl<R: BufRead> EventSource for FileListSource<R> {
    fn next_event(&mut self) -> TimeframeResult<Option<RawEvent>> {
        let Some(path) = self.next_file()? else {
            info!(files = self.files_read, "No more input files specified");
            return Ok(None);
        };
        let file = File::open(&path).map_err(|e| {
            error!(file = %path.display(), error = %e, "Cannot open input file");
            e
        })?;
        let event = read_timeframe(BufReader::new(file), &path.display().to_string())?;
        self.files_read += 1;
        info!(
            file = %path.display(),
            channels = event.channels.len(),
            samples = event.sample_count(),
            "Read input file"
        );
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChannelId, TimeframeError};
    use std::fs;
    use std::io::Cursor;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tfgen_reader_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn event_queue_is_fifo() {
        let mut queue = EventQueue::default();
        assert!(queue.is_empty());
        queue.push(RawEvent::default());
        queue.push(RawEvent::new(Vec::new()));
        assert_eq!(queue.len(), 2);
        assert!(queue.next_event().unwrap().is_some());
        assert!(queue.next_event().unwrap().is_some());
        assert!(queue.next_event().unwrap().is_none());
    }

    #[test]
    fn file_list_reads_dumps_in_order() {
        let dir = temp_dir("list");
        fs::write(dir.join("a.dat"), "    0      1    1    2    5    7    6\n").unwrap();
        fs::write(dir.join("b.dat"), "    2      3    0\n").unwrap();
        fs::write(dir.join("files.txt"), "# inputs\na.dat\n\n  b.dat  \n").unwrap();

        let mut source = FileListSource::open(dir.join("files.txt")).unwrap();
        let a = source.next_event().unwrap().unwrap();
        assert_eq!(a.channels[0].id, ChannelId::new(0, 1));
        assert_eq!(a.channels[0].bunches[0].samples, vec![7, 6]);
        let b = source.next_event().unwrap().unwrap();
        assert_eq!(b.channels[0].id, ChannelId::new(2, 3));
        assert!(b.channels[0].bunches.is_empty());
        assert!(source.next_event().unwrap().is_none());
        assert_eq!(source.files_read(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_input_file_is_error() {
        let mut source = FileListSource::new(Cursor::new("/nonexistent/input.dat\n"));
        assert!(matches!(source.next_event(), Err(TimeframeError::Io(_))));
    }

    #[test]
    fn empty_list_is_exhausted() {
        let mut source = FileListSource::new(Cursor::new("\n# nothing\n"));
        assert!(source.next_event().unwrap().is_none());
    }
}
