use std::path::Path;

/// Fixed-seed hash of a byte buffer, as wide as a pointer on the target
///
/// The value is the leading bytes of the Blake3 digest, so it is stable
/// across runs and machines of the same pointer width.
pub fn compute_hash(data: &[u8]) -> usize {
    let digest = blake3::hash(data);
    let mut bytes = [0u8; std::mem::size_of::<usize>()];
    bytes.copy_from_slice(&digest.as_bytes()[..std::mem::size_of::<usize>()]);
    usize::from_le_bytes(bytes)
}

/// Hash of a file's content
pub fn file_hash(path: &Path) -> std::io::Result<usize> {
    let content = std::fs::read(path)?;
    Ok(compute_hash(&content))
}

/// Cache key of one build: expanded source, build options, platform name and
/// device name, concatenated in that order
pub fn fingerprint(source: &str, options: &str, platform: &str, device: &str) -> usize {
    let mut buffer =
        String::with_capacity(source.len() + options.len() + platform.len() + device.len());
    buffer.push_str(source);
    buffer.push_str(options);
    buffer.push_str(platform);
    buffer.push_str(device);
    compute_hash(buffer.as_bytes())
}

/// Zero-padded lowercase hex, two digits per byte of `usize`
pub fn format_fingerprint(hash: usize) -> String {
    format!("{:0width$x}", hash, width = std::mem::size_of::<usize>() * 2)
}
