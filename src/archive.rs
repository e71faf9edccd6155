//! ZIP-backed archive access: a reader and a writer wrapping
//! `zip::ZipArchive`/`ZipWriter` directly rather than a hand-rolled ZIP
//! implementation.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;

/// A fully materialized in-memory copy of an archive's members: path -> raw bytes.
///
/// Members are read eagerly at open time. An IDML package is small enough
/// (a handful of XML parts plus a mimetype entry) that streaming member
/// access buys nothing and the working copy is simply this map, mutated in
/// place by the prefixer and splicer and re-zipped on save.
pub struct Archive {
    members: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    pub fn new() -> Self {
        Self {
            members: BTreeMap::new(),
        }
    }

    /// Reads every member of a ZIP archive into memory.
    pub fn read<R: Read + Seek>(reader: R) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(reader)?;
        let mut members = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            members.insert(name, buf);
        }
        Ok(Self { members })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        Self::read(Cursor::new(bytes))
    }

    pub fn member(&self, path: &str) -> Option<&[u8]> {
        self.members.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.members.contains_key(path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.members.insert(path.into(), bytes);
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.members.remove(path)
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<u8>> {
        self.members
    }

    /// Serializes the current member set into a ZIP stream at the default
    /// compression level. `mimetype` is written first and uncompressed
    /// (`STORED`), matching the IDML/OPC convention of keeping the
    /// magic-byte sniff target byte-exact.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<(), ArchiveError> {
        self.write_to_with_level(writer, 6)
    }

    /// Same as [`Archive::write_to`], but with an explicit Deflate
    /// compression level (1-9) for every member except `mimetype`, which is
    /// always stored uncompressed.
    pub fn write_to_with_level<W: Write + Seek>(
        &self,
        writer: W,
        compression_level: i64,
    ) -> Result<(), ArchiveError> {
        let mut zip = ZipWriter::new(writer);
        if let Some(mimetype) = self.members.get("mimetype") {
            let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("mimetype", opts)?;
            zip.write_all(mimetype)?;
        }
        for (name, bytes) in &self.members {
            if name == "mimetype" {
                continue;
            }
            let opts = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(compression_level));
            zip.start_file(name, opts)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn to_bytes_with_level(&self, compression_level: i64) -> Result<Vec<u8>, ArchiveError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to_with_level(&mut cursor, compression_level)?;
        Ok(cursor.into_inner())
    }
}
