//! Short key codec
//!
//! A link's key is the base62 form of its numeric id, so keys never need to be
//! stored. Ids are drawn at random so keys are not guessable in sequence.

use rand::Rng;
use std::future::Future;

use crate::analytics::error::{AnalyticsError, AnalyticsResult};

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u64 = 62;

/// Smallest id with a six character key
pub const MIN_ID: u64 = 916_132_832; // 62^5
/// Exclusive upper bound; keys stay at most seven characters
pub const MAX_ID: u64 = 3_521_614_606_208; // 62^7

pub const MAX_ATTEMPTS: usize = 10;

pub fn encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(11);
    while n > 0 {
        buf.push(ALPHABET[(n % BASE) as usize] as char);
        n /= BASE;
    }
    buf.iter().rev().collect()
}

pub fn decode(key: &str) -> AnalyticsResult<u64> {
    if key.is_empty() {
        return Err(AnalyticsError::invalid("key is empty"));
    }
    // "0" is the only canonical key with a leading zero
    if key.len() > 1 && key.starts_with('0') {
        return Err(AnalyticsError::invalid("key has a leading zero"));
    }

    key.bytes().try_fold(0u64, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'Z' => b - b'A' + 10,
            b'a'..=b'z' => b - b'a' + 36,
            _ => {
                return Err(AnalyticsError::invalid(format!(
                    "key contains invalid character '{}'",
                    b as char
                )))
            }
        };
        acc.checked_mul(BASE)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| AnalyticsError::invalid("key is too long"))
    })
}

/// Decode a key into a database id
pub fn decode_id(key: &str) -> AnalyticsResult<i64> {
    let id = decode(key)?;
    i64::try_from(id).map_err(|_| AnalyticsError::invalid("key is out of range"))
}

pub fn random_id() -> i64 {
    rand::rng().random_range(MIN_ID..MAX_ID) as i64
}

/// Draw random ids and hand each to `attempt` until it claims one.
///
/// `attempt` returns `None` when the id is already taken, either seen up front
/// or lost to a concurrent insert. Gives up after [`MAX_ATTEMPTS`] draws.
pub async fn generate_unique_id<T, F, Fut>(mut attempt: F) -> AnalyticsResult<T>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    for _ in 0..MAX_ATTEMPTS {
        let claimed = attempt(random_id())
            .await
            .map_err(|e| AnalyticsError::internal("GenerateKey", e))?;
        if let Some(value) = claimed {
            return Ok(value);
        }
    }

    Err(AnalyticsError::internal(
        "GenerateKey",
        anyhow::anyhow!("no free id after {MAX_ATTEMPTS} attempts"),
    ))
}
