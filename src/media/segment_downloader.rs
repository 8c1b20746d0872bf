//! 分段下载器。
//!
//! 先探测资源大小，再按固定分段大小顺序读取并写入目标；每段写入成功后才推进已传输计数，
//! 因此轮询方看到的计数不会超过目标中实际已写入的字节数。

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::resource::{ResourceHandle, check_scheme};
use super::session::{DownloadSession, SessionSnapshot, SessionView};
use super::sink::WritableSink;
use crate::base_system::logging::catch_recoverable;

pub const DEFAULT_SEGMENT_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct SegmentDownloader {
    segment_size: usize,
    cleanup_partial: bool,
}

impl Default for SegmentDownloader {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            cleanup_partial: false,
        }
    }
}

/// `(full_segments, remainder)`：`total / size` 个完整分段，最后一段 `total % size` 字节。
pub fn segment_plan(total: u64, segment_size: usize) -> (u64, usize) {
    let size = segment_size as u64;
    (total / size, (total % size) as usize)
}

impl SegmentDownloader {
    pub fn new(segment_size: usize) -> Result<Self, DownloadError> {
        if segment_size == 0 {
            return Err(DownloadError::InvalidChunkSize);
        }
        Ok(Self {
            segment_size,
            cleanup_partial: false,
        })
    }

    /// 失败时调用 `WritableSink::discard` 清理未完成的输出。
    pub fn cleanup_partial(mut self, enabled: bool) -> Self {
        self.cleanup_partial = enabled;
        self
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn download(
        &self,
        source: &dyn ResourceHandle,
        sink: &mut dyn WritableSink,
    ) -> Result<SessionSnapshot, DownloadError> {
        let session = DownloadSession::new();
        self.download_with(source, sink, &session)
    }

    /// 使用调用方创建的会话下载，调用方可事先通过 `session.view()` 轮询进度。
    pub fn download_with(
        &self,
        source: &dyn ResourceHandle,
        sink: &mut dyn WritableSink,
        session: &DownloadSession,
    ) -> Result<SessionSnapshot, DownloadError> {
        let address = source.address();
        check_scheme(address)?;
        let total = source.probe_len()?;
        session.set_total(total);

        let (full_segments, remainder) = segment_plan(total, self.segment_size);
        debug!(target: "media", address, total, full_segments, remainder, "开始分段下载");

        session.begin();
        match self.transfer(source, sink, session, full_segments, remainder) {
            Ok(()) => {
                session.complete();
                let snap = session.snapshot();
                info!(target: "media", address, bytes = snap.transferred_bytes, "下载完成");
                Ok(snap)
            }
            Err(source_err) => {
                session.fail();
                let transferred = session.snapshot().transferred_bytes;
                warn!(target: "media", address, transferred, error = %source_err, "下载失败");
                if self.cleanup_partial
                    && let Err(e) = sink.discard()
                {
                    warn!(target: "media", address, error = %e, "清理未完成文件失败");
                }
                Err(DownloadError::Transfer {
                    transferred,
                    source: source_err,
                })
            }
        }
    }

    fn transfer(
        &self,
        source: &dyn ResourceHandle,
        sink: &mut dyn WritableSink,
        session: &DownloadSession,
        full_segments: u64,
        remainder: usize,
    ) -> io::Result<()> {
        let mut stream = source.open()?;
        let mut buf = vec![0u8; self.segment_size];

        for _ in 0..full_segments {
            read_segment(stream.as_mut(), &mut buf)?;
            sink.write_segment(&buf)?;
            session.advance(buf.len() as u64);
        }

        // 最后一段可能是 0 字节，仍然作为一步执行。
        let tail = &mut buf[..remainder];
        read_segment(stream.as_mut(), tail)?;
        sink.write_segment(tail)?;
        session.advance(remainder as u64);

        sink.close()
    }

    /// 在后台线程中执行下载，返回可轮询、可等待的句柄。
    pub fn start(
        &self,
        source: Box<dyn ResourceHandle>,
        mut sink: Box<dyn WritableSink>,
    ) -> io::Result<DownloadHandle> {
        let session = DownloadSession::new();
        let view = session.view();
        let downloader = *self;
        let join = thread::Builder::new()
            .name("segment-download".to_string())
            .spawn(move || {
                catch_recoverable(|| downloader.download_with(source.as_ref(), sink.as_mut(), &session))
                    .unwrap_or_else(|_| {
                        session.abort();
                        warn!(target: "media", address = source.address(), "下载线程异常退出");
                        Err(DownloadError::Transfer {
                            transferred: session.snapshot().transferred_bytes,
                            source: io::Error::other("download thread panicked"),
                        })
                    })
            })?;
        Ok(DownloadHandle { view, join })
    }
}

fn read_segment(stream: &mut dyn Read, buf: &mut [u8]) -> io::Result<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended before expected size")
        } else {
            e
        }
    })
}

pub struct DownloadHandle {
    view: SessionView,
    join: JoinHandle<Result<SessionSnapshot, DownloadError>>,
}

impl DownloadHandle {
    pub fn session(&self) -> &SessionView {
        &self.view
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<SessionSnapshot, DownloadError> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(DownloadError::Transfer {
                transferred: self.view.transferred_bytes(),
                source: io::Error::other("download thread panicked"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::session::DownloadStatus;
    use crate::media::sink::{FileSink, MemorySink};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct StaticResource {
        address: String,
        reported: Option<u64>,
        body: Vec<u8>,
        opened: Arc<AtomicBool>,
    }

    impl StaticResource {
        fn new(body: Vec<u8>) -> Self {
            Self {
                address: "http://assets.local/cover.jpg".to_string(),
                reported: Some(body.len() as u64),
                body,
                opened: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl ResourceHandle for StaticResource {
        fn address(&self) -> &str {
            &self.address
        }

        fn probe_len(&self) -> Result<u64, DownloadError> {
            self.reported
                .ok_or_else(|| DownloadError::size_unavailable(&self.address, "missing Content-Length"))
        }

        fn open(&self) -> io::Result<Box<dyn Read + Send>> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.body.clone())))
        }
    }

    /// 每次写入时记录当时的会话计数与写入长度。
    struct ObservingSink {
        view: SessionView,
        written: usize,
        seen: Vec<(u64, usize)>,
        fail_on_write: Option<usize>,
    }

    impl WritableSink for ObservingSink {
        fn write_segment(&mut self, bytes: &[u8]) -> io::Result<()> {
            let counter = self.view.transferred_bytes();
            assert!(counter <= self.written as u64);
            if self.fail_on_write == Some(self.seen.len()) {
                return Err(io::Error::other("disk full"));
            }
            self.seen.push((counter, bytes.len()));
            self.written += bytes.len();
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn twenty_thousand_bytes_in_8k_segments() {
        let resource = StaticResource::new(body(20_000));
        let session = DownloadSession::new();
        let mut sink = ObservingSink {
            view: session.view(),
            written: 0,
            seen: Vec::new(),
            fail_on_write: None,
        };

        let snap = SegmentDownloader::new(8192)
            .unwrap()
            .download_with(&resource, &mut sink, &session)
            .unwrap();

        let lens: Vec<_> = sink.seen.iter().map(|(_, len)| *len).collect();
        assert_eq!(lens, vec![8192, 8192, 3616]);
        // 每段写入前的计数，加上最终值，即外部观察到的序列 8192, 16384, 20000
        let before: Vec<_> = sink.seen.iter().map(|(c, _)| *c).collect();
        assert_eq!(before, vec![0, 8192, 16384]);
        assert_eq!(snap.transferred_bytes, 20_000);
        assert_eq!(snap.total_bytes, Some(20_000));
        assert_eq!(snap.status, DownloadStatus::Complete);
    }

    #[test]
    fn exact_multiple_still_performs_empty_final_step() {
        let resource = StaticResource::new(body(16_384));
        let session = DownloadSession::new();
        let mut sink = ObservingSink {
            view: session.view(),
            written: 0,
            seen: Vec::new(),
            fail_on_write: None,
        };
        let snap = SegmentDownloader::new(8192)
            .unwrap()
            .download_with(&resource, &mut sink, &session)
            .unwrap();
        let lens: Vec<_> = sink.seen.iter().map(|(_, len)| *len).collect();
        assert_eq!(lens, vec![8192, 8192, 0]);
        assert_eq!(snap.status, DownloadStatus::Complete);
        assert_eq!(snap.transferred_bytes, 16_384);
    }

    #[test]
    fn chunk_sum_matches_plan() {
        for (total, size) in [(0u64, 7usize), (1, 8192), (8191, 8192), (100_003, 4096), (9, 3)] {
            let (full, rem) = segment_plan(total, size);
            assert_eq!(full * size as u64 + rem as u64, total);
            assert!(rem < size);

            let data = body(total as usize);
            let resource = StaticResource::new(data.clone());
            let mut sink = MemorySink::new();
            let snap = SegmentDownloader::new(size)
                .unwrap()
                .download(&resource, &mut sink)
                .unwrap();
            assert_eq!(snap.transferred_bytes, total);
            assert!(sink.is_closed());
            assert_eq!(sink.into_inner(), data);
        }
    }

    #[test]
    fn missing_size_fails_before_opening_stream() {
        let mut resource = StaticResource::new(body(10));
        resource.reported = None;
        let opened = resource.opened.clone();
        let session = DownloadSession::new();
        let mut sink = MemorySink::new();

        let err = SegmentDownloader::default()
            .download_with(&resource, &mut sink, &session)
            .unwrap_err();
        assert!(matches!(err, DownloadError::SizeUnavailable { .. }));
        assert!(!opened.load(Ordering::SeqCst));
        assert_eq!(session.snapshot().status, DownloadStatus::Idle);
        assert!(sink.bytes().is_empty());
    }

    #[test]
    fn unsupported_scheme_is_rejected_up_front() {
        let mut resource = StaticResource::new(body(10));
        resource.address = "ftp://assets.local/cover.jpg".to_string();
        let opened = resource.opened.clone();
        let err = SegmentDownloader::default()
            .download(&resource, &mut MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedScheme { .. }));
        assert!(!opened.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_segment_size_is_invalid() {
        assert!(matches!(
            SegmentDownloader::new(0),
            Err(DownloadError::InvalidChunkSize)
        ));
    }

    #[test]
    fn short_stream_fails_and_keeps_partial_output() {
        let mut resource = StaticResource::new(body(5000));
        resource.reported = Some(9000);
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("cut.jpg"));
        let session = DownloadSession::new();

        let err = SegmentDownloader::new(2048)
            .unwrap()
            .download_with(&resource, &mut sink, &session)
            .unwrap_err();
        match err {
            DownloadError::Transfer { transferred, .. } => assert_eq!(transferred, 4096),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.snapshot().status, DownloadStatus::Failed);
        assert_eq!(std::fs::read(sink.partial_path()).unwrap().len(), 4096);
        assert!(!sink.target().exists());
    }

    #[test]
    fn cleanup_removes_partial_output_on_failure() {
        let mut resource = StaticResource::new(body(5000));
        resource.reported = Some(9000);
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("cut.jpg"));

        let err = SegmentDownloader::new(2048)
            .unwrap()
            .cleanup_partial(true)
            .download(&resource, &mut sink)
            .unwrap_err();
        assert!(err.is_transfer());
        assert!(!sink.partial_path().exists());
    }

    #[test]
    fn write_failure_marks_session_failed() {
        let resource = StaticResource::new(body(20_000));
        let session = DownloadSession::new();
        let mut sink = ObservingSink {
            view: session.view(),
            written: 0,
            seen: Vec::new(),
            fail_on_write: Some(1),
        };
        let err = SegmentDownloader::new(8192)
            .unwrap()
            .download_with(&resource, &mut sink, &session)
            .unwrap_err();
        assert!(err.is_transfer());
        let snap = session.snapshot();
        assert_eq!(snap.status, DownloadStatus::Failed);
        assert_eq!(snap.transferred_bytes, 8192);
    }

    /// 限速读取，便于从外部线程观察进度。
    struct SlowResource {
        inner: StaticResource,
    }

    struct SlowReader {
        inner: Cursor<Vec<u8>>,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            let n = buf.len().min(512);
            self.inner.read(&mut buf[..n])
        }
    }

    impl ResourceHandle for SlowResource {
        fn address(&self) -> &str {
            self.inner.address()
        }

        fn probe_len(&self) -> Result<u64, DownloadError> {
            self.inner.probe_len()
        }

        fn open(&self) -> io::Result<Box<dyn Read + Send>> {
            Ok(Box::new(SlowReader {
                inner: Cursor::new(self.inner.body.clone()),
            }))
        }
    }

    #[test]
    fn background_download_progress_is_monotonic() {
        let total = 64 * 1024;
        let resource = SlowResource {
            inner: StaticResource::new(body(total)),
        };
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.bin");
        let handle = SegmentDownloader::new(4096)
            .unwrap()
            .start(Box::new(resource), Box::new(FileSink::new(&target)))
            .unwrap();

        let observed = Arc::new(Mutex::new(Vec::new()));
        while !handle.is_finished() {
            let snap = handle.session().snapshot();
            observed.lock().unwrap().push(snap.transferred_bytes);
            thread::sleep(Duration::from_millis(2));
        }
        let snap = handle.join().unwrap();
        assert_eq!(snap.status, DownloadStatus::Complete);
        assert_eq!(snap.transferred_bytes, total as u64);

        let observed = observed.lock().unwrap();
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
        assert!(observed.iter().all(|&v| v <= total as u64));
        assert_eq!(std::fs::read(&target).unwrap().len(), total);
    }

    /// 第二次写入时 panic。
    struct BrokenSink {
        writes: usize,
    }

    impl WritableSink for BrokenSink {
        fn write_segment(&mut self, _bytes: &[u8]) -> io::Result<()> {
            self.writes += 1;
            if self.writes == 2 {
                panic!("sink vanished");
            }
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panicking_download_thread_leaves_session_failed() {
        let handle = SegmentDownloader::new(8)
            .unwrap()
            .start(
                Box::new(StaticResource::new(body(20))),
                Box::new(BrokenSink { writes: 0 }),
            )
            .unwrap();
        let view = handle.session().clone();

        let err = handle.join().unwrap_err();
        assert!(matches!(err, DownloadError::Transfer { transferred: 8, .. }));
        let snap = view.snapshot();
        assert_eq!(snap.status, DownloadStatus::Failed);
        assert_eq!(snap.transferred_bytes, 8);
    }
}
