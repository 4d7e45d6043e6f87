use rand::SeedableRng;
use rand::rngs::StdRng;

/// Seed derived from the MD5 digest of the trimmed prompt
pub fn prompt_seed(prompt: &str) -> u64 {
    let digest = md5::compute(prompt.trim().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(bytes)
}

/// Deterministic generator for a seeded prompt, OS entropy otherwise
pub fn shuffle_rng(seed_text: Option<&str>) -> StdRng {
    match seed_text {
        Some(text) => StdRng::seed_from_u64(prompt_seed(text)),
        None => StdRng::from_entropy(),
    }
}
