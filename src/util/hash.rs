//! SHA-256 fingerprints of task graphs and object names.
//!
//! Every component is written with a one-byte kind tag, so adjacent
//! fields cannot run into each other (`["ab"]` vs `["a", "b"]`, `None`
//! vs `Some("")`).

use sha2::{Digest, Sha256};

const TAG_STR: u8 = b's';
const TAG_LIST_END: u8 = b']';
const TAG_NONE: u8 = b'-';
const TAG_BOOL: u8 = b'b';
const TAG_INT: u8 = b'i';

/// Length of the hex suffix used to disambiguate object file names.
const SHORT_LEN: usize = 16;

/// Incremental fingerprint over tagged components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint::default()
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update([TAG_STR]);
        self.hasher.update((s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    /// A list of strings, terminated so list boundaries count.
    pub fn update_strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        for s in items {
            self.update_str(s);
        }
        self.hasher.update([TAG_LIST_END]);
        self
    }

    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => self.update_str(s),
            None => {
                self.hasher.update([TAG_NONE]);
                self
            }
        }
    }

    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([TAG_BOOL, b as u8]);
        self
    }

    pub fn update_usize(&mut self, n: usize) -> &mut Self {
        self.hasher.update([TAG_INT]);
        self.hasher.update((n as u64).to_le_bytes());
        self
    }

    /// Full hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// First 16 hex characters of the digest.
    pub fn finish_short(self) -> String {
        let mut digest = self.finish();
        digest.truncate(SHORT_LEN);
        digest
    }
}

/// Suffix distinguishing two sources whose object files would share a
/// name (`a.c` in two directories).
pub fn object_suffix(source: &str) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(source);
    fp.finish_short()
}
