//! Serialized bags: tar and gzip-compressed tar.

use bagsmith_common::constants::BAGIT_TXT;
use bagsmith_common::{Error, Result, SerializationFormat};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tempfile::TempDir;
use tracing::{debug, info};

/// A serialized bag unpacked into a temporary directory.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct Unpacked {
    _dir: TempDir,
    root: PathBuf,
}

impl Unpacked {
    /// The bag's base directory inside the unpacked tree.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Write the bag directory `bag_dir` to `out` as a tar or tar.gz file.
///
/// The archive holds a single top-level directory named after `bag_dir`.
pub fn serialize(bag_dir: &Path, out: &Path, format: SerializationFormat) -> Result<()> {
    if !format.is_serialized() {
        return Err(Error::UnsupportedFormat(format.to_string()));
    }
    if !bag_dir.join(BAGIT_TXT).is_file() {
        return Err(Error::Pack(format!(
            "{} is not a bag directory",
            bag_dir.display()
        )));
    }
    let name = bag_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bag".to_string());

    let file = File::create(out).map_err(|e| Error::io_at(out, e))?;
    match format {
        SerializationFormat::Tar => {
            let mut archive = Builder::new(file);
            append_bag(&mut archive, &name, bag_dir)?;
            archive.into_inner()?.flush()?;
        }
        SerializationFormat::TarGz => {
            let encoder = GzEncoder::new(file, Compression::default());
            let mut archive = Builder::new(encoder);
            append_bag(&mut archive, &name, bag_dir)?;
            archive.into_inner()?.finish()?.flush()?;
        }
        SerializationFormat::Directory => unreachable!("checked above"),
    }

    info!("Serialized bag {:?} to {:?} ({})", bag_dir, out, format);
    Ok(())
}

fn append_bag<W: Write>(archive: &mut Builder<W>, name: &str, bag_dir: &Path) -> Result<()> {
    archive.follow_symlinks(false);
    archive
        .append_dir_all(name, bag_dir)
        .map_err(|e| Error::io_at(bag_dir, e))?;
    archive.finish()?;
    Ok(())
}

/// Unpack a serialized bag into a fresh temporary directory.
pub fn unpack(path: &Path, format: SerializationFormat) -> Result<Unpacked> {
    let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
    let dir = tempfile::tempdir()?;

    match format {
        SerializationFormat::Tar => unpack_into(Archive::new(file), dir.path(), path)?,
        SerializationFormat::TarGz => {
            unpack_into(Archive::new(GzDecoder::new(file)), dir.path(), path)?
        }
        SerializationFormat::Directory => {
            return Err(Error::UnsupportedFormat(format.to_string()));
        }
    }

    let root = find_bag_root(dir.path())?;
    debug!("Unpacked {:?} to {:?}", path, root);
    Ok(Unpacked { _dir: dir, root })
}

fn unpack_into<R: Read>(mut archive: Archive<R>, dest: &Path, source: &Path) -> Result<()> {
    archive
        .unpack(dest)
        .map_err(|e| Error::Pack(format!("cannot unpack {}: {e}", source.display())))
}

/// The unpacked tree either is the bag or holds it as its only directory.
fn find_bag_root(dir: &Path) -> Result<PathBuf> {
    if dir.join(BAGIT_TXT).exists() {
        return Ok(dir.to_path_buf());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        entries.push(entry.map_err(|e| Error::io_at(dir, e))?.path());
    }
    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_bag(root: &Path) {
        fs::create_dir_all(root.join("data/sub")).unwrap();
        fs::write(root.join("bagit.txt"), "BagIt-Version: 1.0\n").unwrap();
        fs::write(root.join("data/sub/a.txt"), "alpha").unwrap();
    }

    #[test]
    fn test_tar_round_trip() {
        for format in [SerializationFormat::Tar, SerializationFormat::TarGz] {
            let dir = tempdir().unwrap();
            let bag_dir = dir.path().join("my-bag");
            make_bag(&bag_dir);

            let out = dir.path().join(format!("my-bag.{format}"));
            serialize(&bag_dir, &out, format).unwrap();

            let unpacked = unpack(&out, format).unwrap();
            assert!(unpacked.root().ends_with("my-bag"));
            assert_eq!(
                fs::read_to_string(unpacked.root().join("data/sub/a.txt")).unwrap(),
                "alpha"
            );
        }
    }

    #[test]
    fn test_serialize_requires_a_bag() {
        let dir = tempdir().unwrap();
        let err = serialize(dir.path(), &dir.path().join("x.tar"), SerializationFormat::Tar)
            .unwrap_err();
        assert!(matches!(err, Error::Pack(_)));
    }

    #[test]
    fn test_directory_is_not_a_serialization() {
        let dir = tempdir().unwrap();
        make_bag(dir.path());
        let out = dir.path().with_extension("out");
        assert!(matches!(
            serialize(dir.path(), &out, SerializationFormat::Directory),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
