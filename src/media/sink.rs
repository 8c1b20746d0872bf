//! 下载写入目标。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait WritableSink: Send {
    fn write_segment(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// 全部写完后调用一次。
    fn close(&mut self) -> io::Result<()>;

    /// 丢弃未完成的输出。默认不做任何事。
    fn discard(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 写入 `<target>.<ext>part`，`close` 时替换目标文件。
///
/// 文件在第一次写入时才创建，失败时 `.part` 文件保留在磁盘上，除非调用 `discard`。
pub struct FileSink {
    target: PathBuf,
    partial: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let partial = partial_path(&target);
        Self {
            target,
            partial,
            file: None,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.partial.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            self.file = Some(File::create(&self.partial)?);
        }
        // 上面刚刚保证了 Some
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("sink not open"))
    }
}

impl WritableSink for FileSink {
    fn write_segment(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file()?.write_all(bytes)
    }

    fn close(&mut self) -> io::Result<()> {
        let file = self.file()?;
        file.flush()?;
        file.sync_all()?;
        self.file.take();
        // best-effort replace
        let _ = fs::remove_file(&self.target);
        fs::rename(&self.partial, &self.target)
    }

    fn discard(&mut self) -> io::Result<()> {
        self.file.take();
        match fs::remove_file(&self.partial) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    path.with_extension(format!(
        "{}part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ))
}

/// 内存写入目标，主要用于测试与小资源。
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl WritableSink for MemorySink {
    fn write_segment(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("sink already closed"));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn discard(&mut self) -> io::Result<()> {
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_replaces_target_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images").join("cover.jpg");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"old").unwrap();

        let mut sink = FileSink::new(&target);
        assert_eq!(sink.partial_path(), dir.path().join("images").join("cover.jpgpart"));
        sink.write_segment(b"new ").unwrap();
        sink.write_segment(b"bytes").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");
        sink.close().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new bytes");
        assert!(!sink.partial_path().exists());
    }

    #[test]
    fn discard_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("a.png"));
        sink.write_segment(b"half").unwrap();
        assert!(sink.partial_path().exists());
        sink.discard().unwrap();
        assert!(!sink.partial_path().exists());
        assert!(!sink.target().exists());
        // 重复丢弃不报错
        sink.discard().unwrap();
    }

    #[test]
    fn nothing_is_created_before_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested").join("x.jpg"));
        assert!(!dir.path().join("nested").exists());
        drop(sink);
    }
}
