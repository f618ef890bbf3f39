//! Output group keys and destination factories.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Identifies one output group.
///
/// The naming scheme is stable: downstream tools locate per-jurisdiction
/// files by [`relative_path`](Self::relative_path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Jurisdiction { zone: u32, code: String },
    Unclassified { zone: u32 },
}

impl GroupKey {
    pub fn jurisdiction(zone: u32, code: impl Into<String>) -> Self {
        GroupKey::Jurisdiction {
            zone,
            code: code.into(),
        }
    }

    pub fn unclassified(zone: u32) -> Self {
        GroupKey::Unclassified { zone }
    }

    /// `{zone}/{code}.csv` or `unclassified/{zone}.csv`
    pub fn relative_path(&self) -> PathBuf {
        match self {
            GroupKey::Jurisdiction { zone, code } => {
                Path::new(&zone.to_string()).join(format!("{}.csv", code))
            }
            GroupKey::Unclassified { zone } => Path::new("unclassified").join(format!("{}.csv", zone)),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Jurisdiction { zone, code } => write!(f, "{}/{}", zone, code),
            GroupKey::Unclassified { zone } => write!(f, "unclassified/{}", zone),
        }
    }
}

/// Creates the destination for a group the first time a record is routed
/// to it.
pub trait OutputFactory {
    type Writer: Write;

    fn create(&mut self, key: &GroupKey) -> io::Result<Self::Writer>;
}

/// Writes each group to `<root>/<relative_path>`, truncating existing files.
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    root: PathBuf,
}

impl DirectoryOutput {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &GroupKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

impl OutputFactory for DirectoryOutput {
    type Writer = BufWriter<File>;

    fn create(&mut self, key: &GroupKey) -> io::Result<Self::Writer> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(BufWriter::new(File::create(path)?))
    }
}

type SharedGroups = Rc<RefCell<BTreeMap<GroupKey, Vec<u8>>>>;

/// Keeps every group in memory. Clones share the same buffers, so a clone
/// kept by the caller can inspect what the splitter wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    groups: SharedGroups,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<GroupKey> {
        self.groups.borrow().keys().cloned().collect()
    }

    pub fn contents(&self, key: &GroupKey) -> Option<String> {
        self.groups
            .borrow()
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn snapshot(&self) -> BTreeMap<GroupKey, Vec<u8>> {
        self.groups.borrow().clone()
    }
}

pub struct MemoryWriter {
    key: GroupKey,
    groups: SharedGroups,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.groups
            .borrow_mut()
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputFactory for MemoryOutput {
    type Writer = MemoryWriter;

    fn create(&mut self, key: &GroupKey) -> io::Result<Self::Writer> {
        self.groups.borrow_mut().insert(key.clone(), Vec::new());
        Ok(MemoryWriter {
            key: key.clone(),
            groups: Rc::clone(&self.groups),
        })
    }
}
