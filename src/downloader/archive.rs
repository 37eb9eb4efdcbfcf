// Archive extraction for packaged tool distributions (ffmpeg builds)

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Packaging format of a downloaded distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveKind {
    /// File extension used for the temporary download
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
        }
    }
}

/// Unpack `archive_path` into `destination` (created if missing)
pub fn extract(archive_path: &Path, kind: ArchiveKind, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    let file = File::open(archive_path)?;

    match kind {
        ArchiveKind::Zip => extract_zip(file, destination),
        ArchiveKind::TarGz => Archive::new(GzDecoder::new(file)).unpack(destination),
        ArchiveKind::TarXz => Archive::new(XzDecoder::new(file)).unpack(destination),
    }
}

fn extract_zip(file: File, destination: &Path) -> io::Result<()> {
    let mut archive = ZipArchive::new(file).map_err(zip_error)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error)?;
        // Skip entries that would escape the destination
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn zip_error(err: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Depth-first search for a file called `name` under `root`
pub fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Some(path);
        }
    }

    subdirs.sort();
    subdirs.iter().find_map(|dir| find_file(dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_zip_and_find_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("ffmpeg.zip");

        let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.add_directory("ffmpeg-master/bin/", options).unwrap();
        writer.start_file("ffmpeg-master/bin/ffmpeg", options).unwrap();
        writer.write_all(b"binary").unwrap();
        writer.start_file("ffmpeg-master/LICENSE.txt", options).unwrap();
        writer.write_all(b"GPL").unwrap();
        writer.finish().unwrap();

        let out = dir.path().join("staging");
        extract(&archive_path, ArchiveKind::Zip, &out).unwrap();

        let found = find_file(&out, "ffmpeg").unwrap();
        assert!(found.ends_with("ffmpeg-master/bin/ffmpeg"));
        assert_eq!(fs::read(found).unwrap(), b"binary");
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("ffmpeg.tar.gz");

        {
            let encoder = flate2::write::GzEncoder::new(
                File::create(&archive_path).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(encoder);
            let data = b"binary";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "ffmpeg-linux64/bin/ffmpeg", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = dir.path().join("staging");
        extract(&archive_path, ArchiveKind::TarGz, &out).unwrap();
        assert!(find_file(&out, "ffmpeg").is_some());
        assert!(find_file(&out, "ffprobe").is_none());
    }

    #[test]
    fn test_corrupt_zip_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("broken.zip");
        fs::write(&archive_path, b"not a zip").unwrap();

        let err = extract(&archive_path, ArchiveKind::Zip, &dir.path().join("out")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_archive_extensions() {
        assert_eq!(ArchiveKind::Zip.extension(), "zip");
        assert_eq!(ArchiveKind::TarXz.extension(), "tar.xz");
    }
}
