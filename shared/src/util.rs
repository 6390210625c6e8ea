use rand::Rng;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of an artifact storage key
pub const ARTIFACT_KEY_LEN: usize = 32;

/// Generate a random artifact storage key drawn from `[A-Za-z]`.
pub fn artifact_key() -> String {
    let mut rng = rand::thread_rng();
    (0..ARTIFACT_KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}
