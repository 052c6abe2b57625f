//! Walks a codebase directory and reads the files worth indexing.
use crate::chunk::SourceFile;
use crate::config::DiscoveryConfig;
use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::path::Path;
use tracing::{debug, info, warn};

/// Collect every supported file under `root`, sorted by relative path.
///
/// Honours `.gitignore`, skips the configured directories, binary files and
/// files larger than `max_file_bytes`. Paths are relative to `root` with
/// forward slashes.
pub fn discover(root: &Path, config: &DiscoveryConfig) -> Result<Vec<SourceFile>> {
    anyhow::ensure!(root.is_dir(), "not a directory: {}", root.display());
    info!(root = %root.display(), "Discovering source files");

    let ignore_dirs = config.ignore_dirs.clone();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && ignore_dirs.iter().any(|d| entry.file_name() == d.as_str()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if !has_supported_extension(path, config) {
            continue;
        }

        match read_source(root, path, config.max_file_bytes) {
            Ok(Some(file)) => files.push(file),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read file"),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    info!(files = files.len(), "Discovery complete");
    Ok(files)
}

fn has_supported_extension(path: &Path, config: &DiscoveryConfig) -> bool {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    config
        .extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn read_source(root: &Path, path: &Path, max_bytes: u64) -> Result<Option<SourceFile>> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    if size > max_bytes {
        debug!(path = %path.display(), size, "Skipping large file");
        return Ok(None);
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Some(text) = decode(&bytes) else {
        debug!(path = %path.display(), "Skipping binary file");
        return Ok(None);
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = relative.to_string_lossy().replace('\\', "/");
    Ok(Some(SourceFile::new(relative, text)))
}

/// Decode file bytes to text, or `None` for binary content.
///
/// A BOM wins; otherwise UTF-8 is tried before guessing a legacy encoding.
fn decode(bytes: &[u8]) -> Option<String> {
    let encoding = match Encoding::for_bom(bytes) {
        Some((encoding, _)) => encoding,
        None if bytes.contains(&0) => return None,
        None => match std::str::from_utf8(bytes) {
            Ok(text) => return Some(text.to_string()),
            Err(_) => {
                let mut detector = EncodingDetector::new();
                detector.feed(bytes, true);
                detector.guess(None, true)
            }
        },
    };

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = encoding.name(), "Replaced undecodable bytes");
    }
    Some(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::languages::Language;
    use std::fs;

    #[test]
    fn test_discover_filters_and_normalises() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("pkg/foo.py"), "def helper():\n    pass\n").unwrap();
        fs::write(root.join("main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x()\n").unwrap();
        fs::write(root.join("image.png"), [0x89, 0x50]).unwrap();
        fs::write(root.join("blob.txt"), [b'a', 0, b'b']).unwrap();

        let files = discover(root, &DiscoveryConfig::default()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.rs", "pkg/foo.py"]);
        assert_eq!(files[1].language, Some(Language::Python));
    }

    #[test]
    fn test_large_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.py"), "x = 1\n".repeat(100)).unwrap();
        let config = DiscoveryConfig {
            max_file_bytes: 10,
            ..DiscoveryConfig::default()
        };
        assert!(discover(dir.path(), &config).unwrap().is_empty());
    }

    #[test]
    fn test_legacy_encodings_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("latin.py"),
            b"# Caf\xe9 cr\xe8me br\xfbl\xe9e, d\xe9j\xe0 vu\ndef f():\n    return 1\n",
        )
        .unwrap();

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "def g():\n    return 2\n".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(root.join("wide.py"), utf16).unwrap();

        let files = discover(root, &DiscoveryConfig::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].text.contains("Café crème"));
        assert!(!files[0].text.contains('\u{FFFD}'));
        assert_eq!(files[1].text, "def g():\n    return 2\n");
    }

    #[test]
    fn test_utf8_is_kept_as_is() {
        assert_eq!(decode("héllo\n".as_bytes()).as_deref(), Some("héllo\n"));
        assert_eq!(decode(b"a\0b"), None);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("nope"), &DiscoveryConfig::default()).is_err());
    }
}
