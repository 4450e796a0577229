// ABOUTME: Shared utility functions for Sammati
// ABOUTME: Prefixed ID generation used by every storage layer

/// Generate a unique, prefixed record ID (e.g. `art-K3P0qXbZw7Vr`).
///
/// 12 characters of entropy over a 62-symbol alphabet keeps IDs short
/// enough for logs while making collisions implausible at our volumes.
pub fn new_id(prefix: &str) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();
    format!("{}-{}", prefix, suffix)
}
