//! File metadata: symlink-normalised paths, content-based MIME sniffing and
//! the `Item` type the walker hands to probes.
//!
//! An `Item` unifies plain files and archive members: both expose a path, a
//! stat record, a sniffed MIME type and a repeatable `open()`. Members are
//! backed by an owned buffer decoded from their archive; their stat record
//! is synthesised from member metadata.

pub mod archive;
pub mod walk;

use crate::errors::ScanError;
use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// How much of a stream MIME sniffing looks at.
pub const SNIFF_LEN: usize = 1024;

/// Lexical normalisation: absolute, no `.`/`..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => (),
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, symlink-normalised form of `path`.
///
/// A symlink in the leaf is resolved exactly once; relative targets are
/// resolved against the link's directory. No further following happens.
pub fn canonical<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let mut abs = if path.is_absolute() {
        normalize(path)
    } else {
        match env::current_dir() {
            Ok(cwd) => normalize(&cwd.join(path)),
            Err(_) => normalize(path),
        }
    };
    if let Ok(target) = fs::read_link(&abs) {
        abs = if target.is_absolute() {
            normalize(&target)
        } else {
            let dir = abs.parent().unwrap_or_else(|| Path::new("/"));
            normalize(&dir.join(target))
        };
    }
    abs
}

/// `path` shown relative to the working directory where possible.
pub fn relative_to(path: &Path, cwd: &Path) -> String {
    match path.strip_prefix(cwd) {
        Ok(rest) => format!(".{}{}", std::path::MAIN_SEPARATOR, rest.display()),
        Err(_) => path.display().to_string(),
    }
}

/// MIME type of a content prefix. Magic numbers take precedence; anything
/// unrecognised is classified text or octet-stream by content inspection.
pub fn sniff_mime(buf: &[u8]) -> String {
    if buf.is_empty() {
        return "inode/x-empty".to_string();
    }
    if let Some(kind) = infer::get(buf) {
        return kind.mime_type().to_string();
    }
    if content_inspector::inspect(buf).is_text() {
        "text/plain".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: i64,
}

impl From<&fs::Metadata> for ItemStat {
    fn from(meta: &fs::Metadata) -> Self {
        ItemStat {
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len(),
            mtime: meta.mtime(),
        }
    }
}

/// Reference-counted byte buffer usable as a `Cursor` backing store.
#[derive(Debug, Clone)]
pub struct SharedBytes(pub Arc<Vec<u8>>);

impl SharedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        SharedBytes(Arc::new(data))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone)]
enum Contents {
    /// Re-opened from the filesystem on demand.
    Fs,
    /// Decoded archive member or decompressed stream.
    Buffer(SharedBytes),
}

#[derive(Debug, Clone)]
pub struct Item {
    path: PathBuf,
    mimetype: Option<String>,
    stat: ItemStat,
    contents: Contents,
    depth: usize,
    readable: bool,
}

impl Item {
    /// Builds an item for a regular file, sniffing its MIME type from the
    /// first `SNIFF_LEN` bytes. Unreadable files keep `readable = false`
    /// and no MIME type.
    pub fn from_fs(path: &Path, depth: usize) -> Result<Self, ScanError> {
        let path = canonical(path);
        let meta = fs::metadata(&path).map_err(|source| ScanError::Inaccessible {
            path: path.clone(),
            source,
        })?;
        let stat = ItemStat::from(&meta);
        let (mimetype, readable) = match fs::File::open(&path) {
            Ok(mut handle) => {
                let mut buf = [0u8; SNIFF_LEN];
                match read_prefix(&mut handle, &mut buf) {
                    Ok(n) => (Some(sniff_mime(&buf[..n])), true),
                    Err(_) => (None, false),
                }
            }
            Err(_) => (None, false),
        };
        Ok(Item {
            path,
            mimetype,
            stat,
            contents: Contents::Fs,
            depth,
            readable,
        })
    }

    /// Builds a buffer-backed item (archive member or decompressed stream).
    pub fn from_buffer(
        path: PathBuf,
        stat: ItemStat,
        data: SharedBytes,
        depth: usize,
    ) -> Self {
        let mimetype = sniff_mime(&data.as_ref()[..data.len().min(SNIFF_LEN)]);
        Item {
            path,
            mimetype: Some(mimetype),
            stat,
            contents: Contents::Buffer(data),
            depth,
            readable: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn stat(&self) -> &ItemStat {
        &self.stat
    }

    pub fn size(&self) -> u64 {
        self.stat.size
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    /// Opens the byte stream. Repeatable: every call yields a fresh reader
    /// positioned at the start. Items are never opened for writing.
    pub fn open(&self) -> Result<Box<dyn io::BufRead>, ScanError> {
        match &self.contents {
            Contents::Fs => {
                let handle = fs::File::open(&self.path).map_err(|source| {
                    ScanError::Inaccessible {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                Ok(Box::new(io::BufReader::new(handle)))
            }
            Contents::Buffer(data) => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Like `read_exact` but happy with a short stream.
fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{BufRead, Write};
    use std::os::unix::fs::symlink;

    #[test]
    fn normalize_should_strip_dots() {
        assert_eq!(PathBuf::from("/a/c"), normalize(Path::new("/a/b/../c")));
        assert_eq!(PathBuf::from("/a/b"), normalize(Path::new("/a/./b/.")));
        assert_eq!(PathBuf::from("/"), normalize(Path::new("/../..")));
    }

    #[test]
    fn canonical_should_resolve_leaf_symlink() {
        let t = tempfile::tempdir().unwrap();
        let target = t.path().join("target");
        File::create(&target).unwrap();
        let link = t.path().join("link");
        symlink("target", &link).unwrap();
        assert_eq!(canonical(&target), canonical(&link));
    }

    #[test]
    fn canonical_should_resolve_absolute_symlink_target() {
        let t = tempfile::tempdir().unwrap();
        let target = t.path().join("real");
        File::create(&target).unwrap();
        let link = t.path().join("abslink");
        symlink(&target, &link).unwrap();
        assert_eq!(canonical(&target), canonical(&link));
    }

    #[test]
    fn sniff_should_classify_text_and_binary() {
        assert_eq!("text/plain", sniff_mime(b"hello world\n"));
        assert_eq!("application/octet-stream", sniff_mime(&[0u8, 159, 146, 150]));
        assert_eq!("inode/x-empty", sniff_mime(b""));
        assert_eq!(
            "application/gzip",
            sniff_mime(&[0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0])
        );
    }

    #[test]
    fn item_from_fs_should_sniff_and_stat() {
        let t = tempfile::tempdir().unwrap();
        let p = t.path().join("note.txt");
        writeln!(File::create(&p).unwrap(), "some text").unwrap();
        let item = Item::from_fs(&p, 1).unwrap();
        assert_eq!(Some("text/plain"), item.mimetype());
        assert!(item.readable());
        assert_eq!(10, item.size());
        assert_eq!(1, item.depth());
    }

    #[test]
    fn buffered_item_should_reopen_from_start() {
        let data = SharedBytes::new(b"line one\nline two\n".to_vec());
        let item = Item::from_buffer(PathBuf::from("/a/b"), ItemStat::default(), data, 0);
        for _ in 0..2 {
            let mut line = String::new();
            item.open().unwrap().read_line(&mut line).unwrap();
            assert_eq!("line one\n", line);
        }
    }

    #[test]
    fn relative_to_should_shorten_under_cwd() {
        assert_eq!(
            "./src/lib.rs",
            relative_to(Path::new("/work/src/lib.rs"), Path::new("/work"))
        );
        assert_eq!(
            "/elsewhere/x",
            relative_to(Path::new("/elsewhere/x"), Path::new("/work"))
        );
    }
}
