//! A convenience module for hashing things with SHA-256.

/// SHA-256 digest a single input.
pub fn digest(input: &[u8]) -> [u8; 32] {
    digest_many(&[input])
}

/// SHA-256 digest several input slices concatenated together, without
/// allocating.
pub fn digest_many(inputs: &[&[u8]]) -> [u8; 32] {
    let mut ctx = context();
    for input in inputs {
        ctx.update(input);
    }
    let digest = ctx.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Create a SHA-256 digest context for manually hashing larger inputs.
pub fn context() -> ring::digest::Context {
    ring::digest::Context::new(&ring::digest::SHA256)
}
