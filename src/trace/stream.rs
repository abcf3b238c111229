//! 命名的只追加输出流
//!
//! 文件 I/O 由 `StreamFactory` 屏蔽：运行实验时写文件，测试时写内存。

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Tracer 内部输出流的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub usize);

/// 打开命名输出流
pub trait StreamFactory: Send {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write + Send>>;
}

pub struct OutputStream {
    name: String,
    out: Box<dyn Write + Send>,
    records: u64,
}

impl OutputStream {
    pub fn new(name: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            out,
            records: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已写入的记录数
    pub fn records(&self) -> u64 {
        self.records
    }

    /// 追加一行
    pub fn append(&mut self, line: fmt::Arguments<'_>) -> io::Result<()> {
        self.out.write_fmt(line)?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("name", &self.name)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

/// 每个流写到 `dir/<name>`
#[derive(Debug, Clone)]
pub struct FileStreams {
    dir: PathBuf,
}

impl FileStreams {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StreamFactory for FileStreams {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        fs::create_dir_all(&self.dir)?;
        let file = File::create(self.dir.join(name))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// 内存输出流（测试用）；克隆后共享同一份存储。
#[derive(Debug, Clone, Default)]
pub struct MemoryStreams {
    store: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有已打开流的名字（按字典序）
    pub fn names(&self) -> Vec<String> {
        match self.store.lock() {
            Ok(store) => store.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        let store = self.store.lock().ok()?;
        store
            .get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn lines(&self, name: &str) -> Vec<String> {
        self.contents(name)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl StreamFactory for MemoryStreams {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| io::Error::other("memory stream store poisoned"))?;
        store.insert(name.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            store: Arc::clone(&self.store),
        }))
    }
}

struct MemoryWriter {
    name: String,
    store: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| io::Error::other("memory stream store poisoned"))?;
        store.entry(self.name.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
