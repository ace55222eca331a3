use std::time::SystemTime;

/// Seconds of wall clock time since the unix epoch. Used to stamp log
/// records for long running streams.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock reads before the unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_nonzero() {
        assert!(timestamp_secs() > 1_500_000_000);
    }
}
