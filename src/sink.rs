use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Append-only byte sink a table is written into.
///
/// The table builder owns its sink for the whole build and never writes to
/// it concurrently.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered bytes down to the OS.
    fn flush(&mut self) -> io::Result<()>;

    /// Make written bytes durable. Sinks without durability return `Ok`.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory sink, mostly for tests and for building tables to ship elsewhere.
impl WritableFile for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: WritableFile + ?Sized> WritableFile for &mut W {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Buffered file sink.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(FileSink {
            writer: BufWriter::new(file),
        })
    }
}

impl WritableFile for FileSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        // Flush buffer + fsync to guarantee durability
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}
