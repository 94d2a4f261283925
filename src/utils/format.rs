//! Human readable formatting helpers

use humansize::{DECIMAL, FormatSizeOptions, format_size};

/// SI byte count, e.g. `512 B`, `1.5 MB`, `42 MB`
pub fn human_bytes(bytes: u64) -> String {
    format_size(bytes, FormatSizeOptions::from(DECIMAL).decimal_places(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(9), "9 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1_500), "1.5 kB");
        assert_eq!(human_bytes(250_000), "250 kB");
        assert_eq!(human_bytes(42_000_000), "42 MB");
        assert_eq!(human_bytes(3_210_000_000), "3.2 GB");
    }
}
