use rand::Rng;
use std::sync::Mutex;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const LENGTH: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Conversation,
    Message,
}

impl Prefix {
    fn as_str(&self) -> &'static str {
        match self {
            Prefix::Conversation => "cnv",
            Prefix::Message => "msg",
        }
    }
}

/// Last timestamp handed out and the per-millisecond counter.
static CLOCK: Mutex<(u64, u64)> = Mutex::new((0, 0));

fn random_base62(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut result = String::with_capacity(length);
    for _ in 0..length {
        let idx = rng.gen_range(0..62);
        result.push(BASE62_CHARS[idx] as char);
    }
    result
}

fn next_sequence(timestamp: u64) -> u64 {
    let mut clock = match CLOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if clock.0 != timestamp {
        *clock = (timestamp, 0);
    }
    clock.1 += 1;
    clock.1
}

/// Creates a time-ordered id such as `cnv_0189a3f2c4e1Xa81...`.
pub fn create(prefix: Prefix, timestamp: Option<u64>) -> String {
    let current = timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().max(0) as u64);
    let now = current * 0x1000 + next_sequence(current);

    let mut time_bytes = [0u8; 6];
    for (i, byte) in time_bytes.iter_mut().enumerate() {
        *byte = ((now >> (40 - 8 * i)) & 0xff) as u8;
    }

    format!(
        "{}_{}{}",
        prefix.as_str(),
        hex::encode(time_bytes),
        random_base62(LENGTH - 12)
    )
}

pub fn conversation() -> String {
    create(Prefix::Conversation, None)
}

pub fn message() -> String {
    create(Prefix::Message, None)
}

pub fn validate_prefix(id: &str, expected: Prefix) -> bool {
    id.strip_prefix(expected.as_str())
        .is_some_and(|rest| rest.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_id() {
        let id = create(Prefix::Conversation, None);
        assert!(id.starts_with("cnv_"));
        assert_eq!(id.len(), 30);
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let first = create(Prefix::Message, Some(1_700_000_000_000));
        let second = create(Prefix::Message, Some(1_700_000_000_001));
        assert!(first < second);
    }

    #[test]
    fn test_validate_prefix() {
        let id = message();
        assert!(validate_prefix(&id, Prefix::Message));
        assert!(!validate_prefix(&id, Prefix::Conversation));
    }
}
