// Archive packaging - bundles finished tracks into one zip
//
// Member order matches input order; a zero-padded sequence prefix keeps
// names unique even when titles collide. The archive takes ownership of
// the content: sources are deleted as they are added.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::errors::ConvertError;
use super::models::Limits;
use super::utils::clean_filename;

pub struct Packager {
    max_file_bytes: u64,
}

impl Packager {
    pub fn new(limits: &Limits) -> Self {
        Self {
            max_file_bytes: limits.max_file_size_bytes(),
        }
    }

    /// Build the archive bytes. Oversized or vanished inputs are skipped,
    /// not fatal; any archive-construction I/O error is total failure.
    pub fn package(&self, files: &[(PathBuf, String)]) -> Result<Vec<u8>, ConvertError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (index, (path, title)) in files.iter().enumerate() {
            if !path.exists() {
                eprintln!("[Packager] File missing, skipping: {}", path.display());
                continue;
            }

            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_bytes {
                eprintln!(
                    "[Packager] File too large ({} bytes), skipping: {}",
                    size,
                    path.display()
                );
                continue;
            }

            let member = clean_filename(&format!("{:02}_{}.mp3", index + 1, title));
            zip.start_file(&member, options)
                .map_err(|e| ConvertError::Packaging(format!("Could not add '{}': {}", member, e)))?;

            let bytes = std::fs::read(path)
                .map_err(|e| ConvertError::Packaging(format!("Could not read '{}': {}", path.display(), e)))?;
            zip.write_all(&bytes)
                .map_err(|e| ConvertError::Packaging(format!("Could not write '{}': {}", member, e)))?;

            eprintln!("[Packager] Added: {}", member);

            // Original is not retained once the archive owns the content
            let _ = std::fs::remove_file(path);
        }

        let cursor = zip
            .finish()
            .map_err(|e| ConvertError::Packaging(format!("Could not finish archive: {}", e)))?;

        let data = cursor.into_inner();
        eprintln!(
            "[Packager] Archive built: {:.2} MB",
            data.len() as f64 / 1_048_576.0
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_track(dir: &std::path::Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; bytes]).unwrap();
        path
    }

    fn member_names(data: &[u8]) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data.to_vec())).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn packager() -> Packager {
        Packager::new(&Limits::default())
    }

    #[test]
    fn test_member_order_and_naming() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            (write_track(dir.path(), "a.mp3", 10), "First Song".to_string()),
            (write_track(dir.path(), "b.mp3", 10), "Second Song".to_string()),
            (write_track(dir.path(), "c.mp3", 10), "Third Song".to_string()),
        ];

        let data = packager().package(&files).unwrap();
        assert_eq!(
            member_names(&data),
            vec!["01_First Song.mp3", "02_Second Song.mp3", "03_Third Song.mp3"]
        );
    }

    #[test]
    fn test_sources_are_deleted_after_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_track(dir.path(), "a.mp3", 10);
        let files = vec![(path.clone(), "Song".to_string())];

        packager().package(&files).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_oversized_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let limits = Limits {
            max_file_size_mb: 1,
            ..Limits::default()
        };
        let files = vec![
            (write_track(dir.path(), "a.mp3", 10), "Small".to_string()),
            (
                write_track(dir.path(), "b.mp3", 2 * 1024 * 1024),
                "Huge".to_string(),
            ),
            (write_track(dir.path(), "c.mp3", 10), "Also Small".to_string()),
        ];

        let data = Packager::new(&limits).package(&files).unwrap();
        // Prefixes keep the original input positions
        assert_eq!(member_names(&data), vec!["01_Small.mp3", "03_Also Small.mp3"]);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            (dir.path().join("vanished.mp3"), "Gone".to_string()),
            (write_track(dir.path(), "a.mp3", 10), "Here".to_string()),
        ];

        let data = packager().package(&files).unwrap();
        assert_eq!(member_names(&data), vec!["02_Here.mp3"]);
    }

    #[test]
    fn test_titles_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![(
            write_track(dir.path(), "a.mp3", 10),
            "AC/DC:Back\\In|Black?".to_string(),
        )];

        let data = packager().package(&files).unwrap();
        let names = member_names(&data);
        assert_eq!(names, vec!["01_AC_DC_Back_In_Black_.mp3"]);
    }

    #[test]
    fn test_archive_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"unique-audio-bytes").unwrap();

        let data = packager()
            .package(&[(path, "Song".to_string())])
            .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        let mut member = archive.by_index(0).unwrap();
        let mut content = Vec::new();
        member.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"unique-audio-bytes");
    }
}
