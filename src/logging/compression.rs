use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive format applied to a log file once it has been rotated out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zip,
    #[cfg(feature = "compression")]
    Gzip,
    #[cfg(feature = "compression")]
    Zstd,
}

impl Compression {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Zip => Some("zip"),
            #[cfg(feature = "compression")]
            Compression::Gzip => Some("gz"),
            #[cfg(feature = "compression")]
            Compression::Zstd => Some("zst"),
        }
    }

    /// Compresses `path` next to itself and removes the original.
    /// Returns the path of the file that now holds the data.
    pub fn compress(&self, path: &Path) -> Result<PathBuf> {
        let Some(ext) = self.extension() else {
            return Ok(path.to_path_buf());
        };

        let target = with_appended_extension(path, ext);
        let source = File::open(path).map_err(|e| Error::io(path, e))?;
        let out = File::create(&target).map_err(|e| Error::io(&target, e))?;

        let written = match self {
            Compression::None => Ok(()),
            Compression::Zip => write_zip(path, source, out),
            #[cfg(feature = "compression")]
            Compression::Gzip => write_gzip(source, out),
            #[cfg(feature = "compression")]
            Compression::Zstd => zstd::stream::copy_encode(source, out, 0),
        };

        if let Err(e) = written {
            let _ = fs::remove_file(&target);
            return Err(Error::io(&target, e));
        }

        fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        Ok(target)
    }
}

fn write_zip(path: &Path, mut source: File, out: File) -> io::Result<()> {
    let entry = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry, options).map_err(io::Error::other)?;
    io::copy(&mut source, &mut zip)?;
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

#[cfg(feature = "compression")]
fn write_gzip(mut source: File, out: File) -> io::Result<()> {
    let mut encoder = flate2::write::GzEncoder::new(out, flate2::Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn rotated_file(dir: &Path) -> PathBuf {
        let path = dir.join("run_info.2024-03-01_09-30-00_000000.log");
        fs::write(&path, "2024-03-01 09:30:00 | INFO | hello\n").unwrap();
        path
    }

    #[test]
    fn test_none_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = rotated_file(dir.path());
        let out = Compression::None.compress(&path).unwrap();
        assert_eq!(out, path);
        assert!(path.exists());
    }

    #[test]
    fn test_zip_replaces_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = rotated_file(dir.path());
        let out = Compression::Zip.compress(&path).unwrap();

        assert!(!path.exists());
        assert_eq!(out.extension().unwrap(), "zip");

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut entry = archive
            .by_name("run_info.2024-03-01_09-30-00_000000.log")
            .unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert!(contents.ends_with("| INFO | hello\n"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = rotated_file(dir.path());
        let out = Compression::Gzip.compress(&path).unwrap();
        assert!(!path.exists());

        let mut decoder = flate2::read::GzDecoder::new(File::open(&out).unwrap());
        let mut contents = String::new();
        decoder.read_to_string(&mut contents).unwrap();
        assert!(contents.contains("hello"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zstd_output_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = rotated_file(dir.path());
        let out = Compression::Zstd.compress(&path).unwrap();
        assert!(out.to_string_lossy().ends_with(".log.zst"));
        let bytes = zstd::stream::decode_all(File::open(&out).unwrap()).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("hello"));
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Compression::Zip
            .compress(&dir.path().join("absent.log"))
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
