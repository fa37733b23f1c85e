//! Consistent hash bucketing
//!
//! Every percentage decision (rollouts and experiment splits) goes through
//! [`bucket`]. The digest is part of the interface: other implementations
//! must produce the same bucket for the same key.
//!
//! Contract:
//!
//! 1. MD5 over the UTF-8 bytes of the key.
//! 2. The 16-byte digest read as a big-endian unsigned 128-bit integer.
//! 3. `(n mod 100) / 100`.
//!
//! This yields 100 buckets of width 0.01; nothing finer than 1% can be
//! expressed.

/// Number of distinct buckets
pub const BUCKET_COUNT: u8 = 100;

/// Bucket index in `0..100` for a key
pub fn bucket_index(key: &str) -> u8 {
    let digest = md5::compute(key.as_bytes());
    let n = u128::from_be_bytes(digest.0);
    (n % u128::from(BUCKET_COUNT)) as u8
}

/// Stable fraction in `[0, 1)` for a key
///
/// # Examples
///
/// ```
/// use vexil_features::bucket::{bucket, flag_bucket_key};
///
/// let b = bucket(&flag_bucket_key("new_ui", "user-1"));
/// assert!((0.0..1.0).contains(&b));
/// assert_eq!(b, bucket("new_ui:user-1"));
/// ```
pub fn bucket(key: &str) -> f64 {
    f64::from(bucket_index(key)) / f64::from(BUCKET_COUNT)
}

/// Bucket key for a flag rollout: `flagKey:userId`
pub fn flag_bucket_key(flag_key: &str, user_id: &str) -> String {
    format!("{}:{}", flag_key, user_id)
}

/// Bucket key for an experiment split: `experimentId:userId`
pub fn experiment_bucket_key(experiment_id: &str, user_id: &str) -> String {
    format!("{}:{}", experiment_id, user_id)
}
