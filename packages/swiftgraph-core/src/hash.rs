//! Stable-ID hasher (`spec.md` §4.1).
//!
//! `stable_id(language, module, name) = hex(SHA1(language + ":" + module + ":" + name))`.
//! Pure, deterministic, 40-char lowercase hex. No other identifier scheme is used.

use sha1::{Digest, Sha1};

/// Derive the deterministic identity for an entity/member/extension.
///
/// For extensions, callers pass `name = "<extended_type>::extension::<file>:<line>"`
/// per `spec.md` §3 so that multiple extensions of the same type coexist.
pub fn stable_id(language: &str, module: &str, name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(language.as_bytes());
    hasher.update(b":");
    hasher.update(module.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
