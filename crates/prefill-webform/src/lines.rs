//! Lazy line reader over a file or any buffered stream.
//!
//! Lines are pulled on demand; nothing beyond the current line is held in
//! memory. Trailing `\r` / `\n` are stripped and invalid UTF-8 is replaced.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Iterator over the lines of a source, optionally capped at `limit` lines.
///
/// A `limit` of 0 reads to EOF. To start over, open the source again.
pub struct LineReader<R> {
    reader: R,
    limit: usize,
    yielded: usize,
    buf: Vec<u8>,
}

impl LineReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, limit: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), limit))
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn from_reader(reader: R, limit: usize) -> Self {
        Self { reader, limit, yielded: 0, buf: Vec::new() }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit != 0 && self.yielded >= self.limit {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
                    self.buf.pop();
                }
                self.yielded += 1;
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
