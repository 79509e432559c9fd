use sha2::{Digest, Sha256};

/// SHA-256 over story inputs. Feed files in sorted relative-path order.
#[derive(Default)]
pub(crate) struct InputHasher {
    hasher: Sha256,
    file_count: usize,
}

impl InputHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, normalized_rel: &str, bytes: &[u8]) {
        self.hasher.update(normalized_rel.as_bytes());
        self.hasher.update([0u8]);
        self.hasher.update(bytes);
        self.file_count += 1;
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn finish(self) -> String {
        to_hex_lower(&self.hasher.finalize())
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(files: &[(&str, &str)]) -> String {
        let mut hasher = InputHasher::new();
        for (rel, body) in files {
            hasher.add_file(rel, body.as_bytes());
        }
        hasher.finish()
    }

    #[test]
    fn digest_is_lower_hex_sha256() {
        let hex = digest(&[]);
        assert_eq!(hex.len(), 64);
        assert_eq!(
            hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn path_and_content_both_matter() {
        let base = digest(&[("map_a.json", "{}")]);
        assert_ne!(base, digest(&[("map_b.json", "{}")]));
        assert_ne!(base, digest(&[("map_a.json", "{ }")]));
        assert_eq!(base, digest(&[("map_a.json", "{}")]));
    }

    #[test]
    fn counts_files() {
        let mut hasher = InputHasher::new();
        hasher.add_file("a", b"1");
        hasher.add_file("b", b"2");
        assert_eq!(hasher.file_count(), 2);
    }
}
