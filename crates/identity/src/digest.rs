//! Bounded SHA-256 digest of an executable.
//!
//! With a positive limit the file size is checked before any byte is read,
//! and at most `limit + 1` bytes are ever read afterwards, so a file that
//! grows between the check and the read still fails. A limit of zero or below
//! hashes the whole file; callers decide at a higher layer whether to hash at
//! all (see [`procattest_core::DigestPolicy`]).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::DigestError;

/// Hash the file at `path`, failing if it is larger than a positive `limit`.
pub fn sha256_digest(path: &Path, limit: i64) -> Result<String, DigestError> {
    let file = File::open(path).map_err(|source| DigestError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    digest_with(file, |f| f.metadata().map(|m| m.len()), path, limit)
}

fn digest_with<R, S>(mut reader: R, size_of: S, path: &Path, limit: i64) -> Result<String, DigestError>
where
    R: Read,
    S: FnOnce(&R) -> io::Result<u64>,
{
    let mut hasher = Sha256::new();
    let read_error = |source| DigestError::Read {
        path: path.to_path_buf(),
        source,
    };

    if limit > 0 {
        let limit = limit as u64;
        let size = size_of(&reader).map_err(|source| DigestError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        if size > limit {
            return Err(DigestError::SizeLimitExceeded {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }

        // The file may grow between stat and read; never hash past the cap.
        let copied =
            io::copy(&mut (&mut reader).take(limit + 1), &mut hasher).map_err(read_error)?;
        if copied > limit {
            return Err(DigestError::SizeLimitExceeded {
                path: path.to_path_buf(),
                size: copied,
                limit,
            });
        }
    } else {
        io::copy(&mut reader, &mut hasher).map_err(read_error)?;
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    struct CountingReader<'a> {
        reads: &'a Cell<usize>,
    }

    impl Read for CountingReader<'_> {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            Ok(0)
        }
    }

    #[test]
    fn test_known_digest() {
        let file = temp_file(b"hello world");

        assert_eq!(sha256_digest(file.path(), 0).unwrap(), HELLO_WORLD_SHA256);
        assert_eq!(sha256_digest(file.path(), 11).unwrap(), HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_empty_file() {
        let file = temp_file(b"");
        assert_eq!(sha256_digest(file.path(), 100).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let contents = vec![0xA5u8; 64 * 1024 + 7];
        let first = temp_file(&contents);
        let second = temp_file(&contents);

        let a = sha256_digest(first.path(), 0).unwrap();
        let b = sha256_digest(first.path(), 0).unwrap();
        let c = sha256_digest(second.path(), -1).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_size_limit_exceeded() {
        let file = temp_file(&[0u8; 500]);

        match sha256_digest(file.path(), 100) {
            Err(DigestError::SizeLimitExceeded { size, limit, .. }) => {
                assert_eq!(size, 500);
                assert_eq!(limit, 100);
            }
            other => panic!("expected SizeLimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_size_limit_checked_before_reading() {
        let reads = Cell::new(0);
        let reader = CountingReader { reads: &reads };

        let result = digest_with(reader, |_| Ok(500), Path::new("/bin/app"), 100);

        assert!(matches!(result, Err(DigestError::SizeLimitExceeded { .. })));
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn test_growth_after_stat_is_not_hashed_past_limit() {
        let mut reader = io::Cursor::new(vec![7u8; 10_000]);

        let result = digest_with(&mut reader, |_| Ok(50), Path::new("/bin/app"), 100);

        match result {
            Err(DigestError::SizeLimitExceeded { size, limit, .. }) => {
                assert_eq!(size, 101);
                assert_eq!(limit, 100);
            }
            other => panic!("expected SizeLimitExceeded, got {:?}", other),
        }
        assert_eq!(reader.position(), 101);
    }

    #[test]
    fn test_content_exactly_at_limit() {
        let contents = vec![3u8; 100];
        let path = Path::new("/bin/app");
        let expected = digest_with(io::Cursor::new(contents.clone()), |_| Ok(0), path, 0).unwrap();

        let capped = digest_with(io::Cursor::new(contents), |_| Ok(100), path, 100);
        assert_eq!(capped.unwrap(), expected);
    }

    #[test]
    fn test_non_positive_limit_skips_stat() {
        let reads = Cell::new(0);
        let reader = CountingReader { reads: &reads };

        let result = digest_with(
            reader,
            |_| Err(io::Error::new(io::ErrorKind::Other, "stat must not run")),
            Path::new("/bin/app"),
            0,
        );

        assert_eq!(result.unwrap(), EMPTY_SHA256);
        assert!(reads.get() > 0);
    }

    #[test]
    fn test_stat_failure() {
        let reader = io::empty();
        let result = digest_with(
            reader,
            |_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Path::new("/bin/app"),
            10,
        );

        assert!(matches!(result, Err(DigestError::Stat { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = sha256_digest(&dir.path().join("missing"), 0);

        assert!(matches!(result, Err(DigestError::Open { .. })));
    }
}
