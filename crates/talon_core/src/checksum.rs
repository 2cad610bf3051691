use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Computes the SHA-256 checksum of a file, lower-case hex encoded.
///
/// Returns `Ok(None)` when the path does not exist, so callers can treat
/// "file is new" as ordinary data rather than an error. Any other I/O
/// failure is propagated.
///
/// The algorithm is part of the manifest contract: changing it invalidates
/// every cached comparison and requires bumping
/// [`MANIFEST_FORMAT_VERSION`](crate::manifest::MANIFEST_FORMAT_VERSION).
pub fn checksum(path: &Path) -> io::Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(Some(hex::encode(hasher.finalize())))
}

/// Checksum of an in-memory buffer, matching [`checksum`] for equal content.
pub fn checksum_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = TempDir::new().unwrap();
        let result = checksum(&dir.path().join("nope.jar")).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            checksum(&path).unwrap().unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_and_bytes_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        assert_eq!(checksum(&path).unwrap().unwrap(), checksum_bytes(&data));
    }
}
