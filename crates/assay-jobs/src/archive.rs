//! Result archives.
//!
//! A job's whole workspace is packed into a deflate-compressed zip and emitted
//! as a stream of chunks while it is being built. The zip is written to a
//! non-seekable sink on a blocking task; chunks travel over a bounded channel,
//! so a slow reader applies backpressure instead of the archive piling up in
//! memory. A failure part way through is sent down the stream as an error,
//! never as a silently short archive.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::directory::ArtifactStore;
use crate::store::JobStore;
use crate::types::parse_id;
use crate::{JobError, Result};

/// Chunks of an archive in the making.
pub type ArchiveStream = ReceiverStream<io::Result<Bytes>>;

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

/// Builds archives of job workspaces.
#[derive(Clone)]
pub struct ArchiveBuilder {
    store: Arc<JobStore>,
    artifacts: ArtifactStore,
}

impl ArchiveBuilder {
    pub fn new(store: Arc<JobStore>, artifacts: ArtifactStore) -> Self {
        Self { store, artifacts }
    }

    /// Resolve the workspace to archive.
    ///
    /// An unknown job and a job whose workspace has vanished are both
    /// not-found errors.
    pub fn open(&self, job_id: &str) -> Result<PathBuf> {
        let job_id = parse_id(job_id)?;
        let job = self.store.get_job(&job_id)?;
        if !self.artifacts.exists(&job.id) {
            return Err(JobError::WorkspaceMissing(job.id));
        }
        Ok(self.artifacts.path_for(&job.id))
    }

    /// Start streaming the archive of a job's workspace.
    ///
    /// Lookup errors are returned before any byte is produced.
    pub fn stream(&self, job_id: &str) -> Result<ArchiveStream> {
        let workspace = self.open(job_id)?;
        let span = tracing::debug_span!("archive", job_id);
        Ok(spawn_archive(span, move |sink| write_archive(&workspace, sink)))
    }
}

/// Run `write` on a blocking task, forwarding what it writes as stream chunks.
///
/// If `write` fails, the error is the last item of the stream.
fn spawn_archive<F>(span: tracing::Span, write: F) -> ArchiveStream
where
    F: FnOnce(&mut BufWriter<ChannelWriter>) -> Result<()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let errors = tx.clone();
        let mut sink = BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter { tx });

        let written = write(&mut sink).and_then(|()| Ok(sink.flush()?));
        match written {
            Ok(()) => tracing::debug!("Archive complete"),
            Err(e) => {
                // Dropping the BufWriter would flush its remainder after the error.
                let (_writer, _unflushed) = sink.into_parts();
                tracing::warn!(error = %e, "Archive aborted");
                let _ = errors.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Write a zip of everything under `dir` to `out`, with paths relative to `dir`.
///
/// Zip entry names are UTF-8, so a non-UTF-8 file name is stored in its lossy
/// form. An entry whose name collides with one already written is skipped
/// (with its contents, for a directory) rather than failing the archive.
pub fn write_archive<W: Write>(dir: &Path, out: W) -> Result<()> {
    let mut zip = ZipWriter::new_stream(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut names = HashSet::new();

    let mut entries = WalkDir::new(dir).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| JobError::Io(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        }

        let name = archive_name(relative);
        if relative.to_str().is_none() {
            tracing::warn!(path = %entry.path().display(), %name, "Non-UTF-8 name stored lossily");
        }
        if !names.insert(name.clone()) {
            tracing::warn!(path = %entry.path().display(), %name, "Skipping entry with duplicate archive name");
            if file_type.is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }

        if file_type.is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}

/// Zip entry names always use `/`.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Blocking `Write` adapter that forwards each write as one chunk.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
