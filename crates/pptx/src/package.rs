//! ZIP package access for PPTX containers.
//!
//! A [`Package`] is an in-memory snapshot of every part in the archive, in
//! archive order. Parts are replaced in the snapshot and written out as a
//! complete new archive, which is swapped over the destination only once it
//! has been fully written.

use regex::Regex;
use slidetext_core::{Error, Result};
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::LazyLock;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File suffix recognized as a presentation container.
pub const CONTAINER_EXTENSION: &str = "pptx";

/// Content-type manifest part.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Folder holding slide parts.
pub const SLIDES_PREFIX: &str = "ppt/slides/";

/// Folder holding embedded media parts.
pub const MEDIA_PREFIX: &str = "ppt/media/";

/// ZIP local file header magic.
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

static SLIDE_PART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// One archive entry.
#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// In-memory snapshot of a presentation container.
#[derive(Clone)]
pub struct Package {
    parts: Vec<Part>,
}

impl Package {
    /// Open a container from disk.
    ///
    /// Fails with [`Error::InvalidContainer`] when the path does not exist,
    /// lacks the `.pptx` suffix, is empty, or is not a ZIP archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_container_path(path)?;
        let data = fs::read(path)?;
        Self::from_bytes(data).map_err(|e| match e {
            Error::InvalidContainer(reason) => {
                Error::InvalidContainer(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Load a container from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidContainer("zero-byte input".to_string()));
        }
        if !data.starts_with(ZIP_MAGIC) {
            return Err(Error::InvalidContainer("not a ZIP archive".to_string()));
        }
        Self::from_reader(Cursor::new(data))
    }

    /// Load a container from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::InvalidContainer(format!("Failed to open ZIP: {}", e)))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| Error::ZipError(format!("Failed to read entry {}: {}", i, e)))?;
            let mut data = Vec::with_capacity(preallocation(file.size()));
            file.read_to_end(&mut data)
                .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", file.name(), e)))?;
            parts.push(Part {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        log::debug!("loaded package with {} part(s)", parts.len());
        Ok(Self { parts })
    }

    /// Bytes of a part by name.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| !p.is_dir && p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Whether a part exists.
    pub fn contains(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// Names of all file parts, in archive order.
    pub fn part_names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|p| !p.is_dir)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Names of file parts under a path prefix, in archive order.
    pub fn list_prefix(&self, prefix: &str) -> Vec<&str> {
        self.part_names()
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect()
    }

    /// Replace a part's bytes, or append a new part.
    ///
    /// The part keeps its position and compression method when it already exists.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| !p.is_dir && p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
                compression: CompressionMethod::Deflated,
                is_dir: false,
            }),
        }
    }

    /// Part name of a slide by 1-based number.
    pub fn slide_part_name(number: usize) -> String {
        format!("{}slide{}.xml", SLIDES_PREFIX, number)
    }

    /// Numbers of all slide parts, ascending.
    pub fn slide_numbers(&self) -> Vec<usize> {
        let mut numbers: Vec<usize> = self
            .part_names()
            .into_iter()
            .filter_map(|name| {
                SLIDE_PART_REGEX
                    .captures(name)
                    .and_then(|c| c[1].parse().ok())
            })
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    /// Write the package as a ZIP archive.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);

        for part in &self.parts {
            let method = match part.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = FileOptions::default().compression_method(method);

            if part.is_dir {
                zip.add_directory(part.name.as_str(), options)
                    .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", part.name, e)))?;
                continue;
            }
            zip.start_file(part.name.as_str(), options)
                .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", part.name, e)))?;
            zip.write_all(&part.data)?;
        }

        zip.finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish archive: {}", e)))
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Write the package to `dest`, replacing any existing file atomically.
    pub fn save(&self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        commit_atomic(dest, |file| self.write_to(file).map(|_| ()))?;
        log::debug!("saved package to {}", dest.display());
        Ok(())
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("parts", &self.parts.len())
            .finish()
    }
}

/// Check the suffix and existence of a container path without reading it.
pub fn validate_container_path(path: &Path) -> Result<()> {
    let has_suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CONTAINER_EXTENSION));
    if !has_suffix {
        return Err(Error::InvalidContainer(format!(
            "{}: expected a .{} file",
            path.display(),
            CONTAINER_EXTENSION
        )));
    }
    if !path.is_file() {
        return Err(Error::InvalidContainer(format!(
            "{}: file not found",
            path.display()
        )));
    }
    Ok(())
}

/// Build a file next to `dest` and rename it over `dest` once `build` succeeds.
///
/// On any failure the temporary file is removed and `dest` is left untouched.
pub(crate) fn commit_atomic<F>(dest: &Path, build: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".slidetext-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    build(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| Error::IoError(e.error))?;
    Ok(())
}

/// Largest buffer reserved up front from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

// Declared sizes come from the archive header and are not trusted.
fn preallocation(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_from_bytes_rejects_non_container() {
        assert!(matches!(
            Package::from_bytes(Vec::new()),
            Err(Error::InvalidContainer(_))
        ));
        assert!(matches!(
            Package::from_bytes(b"hello world".to_vec()),
            Err(Error::InvalidContainer(_))
        ));
    }

    #[test]
    fn test_open_rejects_wrong_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.zip");
        fs::write(&path, sample_zip(&[("a.xml", b"<a/>".as_slice())])).unwrap();
        assert!(matches!(Package::open(&path), Err(Error::InvalidContainer(_))));
    }

    #[test]
    fn test_open_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pptx");
        assert!(matches!(Package::open(&missing), Err(Error::InvalidContainer(_))));

        let empty = dir.path().join("empty.pptx");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(Package::open(&empty), Err(Error::InvalidContainer(_))));
    }

    #[test]
    fn test_parts_keep_order_and_content() {
        let data = sample_zip(&[
            ("[Content_Types].xml", b"<Types/>".as_slice()),
            ("ppt/slides/slide2.xml", b"<two/>".as_slice()),
            ("ppt/slides/slide10.xml", b"<ten/>".as_slice()),
            ("ppt/slides/slide1.xml", b"<one/>".as_slice()),
            ("ppt/media/media3.m4a", b"\x00\x01".as_slice()),
        ]);
        let package = Package::from_bytes(data).unwrap();
        assert_eq!(
            package.part_names(),
            vec![
                "[Content_Types].xml",
                "ppt/slides/slide2.xml",
                "ppt/slides/slide10.xml",
                "ppt/slides/slide1.xml",
                "ppt/media/media3.m4a",
            ]
        );
        assert_eq!(package.slide_numbers(), vec![1, 2, 10]);
        assert_eq!(package.list_prefix(MEDIA_PREFIX), vec!["ppt/media/media3.m4a"]);
        assert_eq!(package.part("ppt/slides/slide1.xml"), Some(&b"<one/>"[..]));
        assert!(!package.contains("ppt/slides/slide3.xml"));
    }

    #[test]
    fn test_preallocation_ignores_inflated_sizes() {
        assert_eq!(preallocation(0), 0);
        assert_eq!(preallocation(4096), 4096);
        assert_eq!(preallocation(u64::MAX), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn test_set_part_replaces_in_place() {
        let data = sample_zip(&[("a.xml", b"<a/>".as_slice()), ("b.xml", b"<b/>".as_slice())]);
        let mut package = Package::from_bytes(data).unwrap();
        package.set_part("a.xml", b"<A/>".to_vec());
        package.set_part("c.xml", b"<c/>".to_vec());

        let reloaded = Package::from_bytes(package.to_bytes().unwrap()).unwrap();
        assert_eq!(reloaded.part_names(), vec!["a.xml", "b.xml", "c.xml"]);
        assert_eq!(reloaded.part("a.xml"), Some(&b"<A/>"[..]));
        assert_eq!(reloaded.part("b.xml"), Some(&b"<b/>"[..]));
    }

    #[test]
    fn test_save_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pptx");
        fs::write(&dest, b"old").unwrap();

        let package = Package::from_bytes(sample_zip(&[("a.xml", b"<a/>".as_slice())])).unwrap();
        package.save(&dest).unwrap();

        let reopened = Package::open(&dest).unwrap();
        assert_eq!(reopened.part("a.xml"), Some(&b"<a/>"[..]));
    }

    #[test]
    fn test_failed_commit_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("deck.pptx");
        let original = sample_zip(&[("a.xml", b"<a/>".as_slice())]);
        fs::write(&dest, &original).unwrap();

        let result = commit_atomic(&dest, |file| {
            file.write_all(b"PK partial")?;
            Err(Error::ZipError("simulated failure".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&dest).unwrap(), original);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "deck.pptx")
            .collect();
        assert!(leftovers.is_empty());
    }
}
