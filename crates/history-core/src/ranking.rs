//! Pure functions over `(frequency, last_used_at, now)`. No I/O.

use sha2::{Digest, Sha256};

/// Frequency weight `alpha` in the frecency score.
pub const ALPHA: f64 = 2.0;
/// Recency weight `beta` in the frecency score.
pub const BETA: f64 = 100.0;
/// Upper bound on the number of days used in the recency term.
pub const MAX_DAYS: i64 = 365;

const SECONDS_PER_DAY: i64 = 86_400;

/// Frecency score: `alpha * frequency + beta / days`, with `days` clamped to
/// `[1, MAX_DAYS]`. Total, deterministic, monotone non-decreasing in
/// `frequency` and monotone non-increasing in `now - last_used_at`.
pub fn rank(frequency: i64, last_used_at: i64, now: i64) -> f64 {
    let elapsed_days = (now - last_used_at) / SECONDS_PER_DAY;
    let days = elapsed_days.clamp(1, MAX_DAYS);
    ALPHA * frequency as f64 + BETA / days as f64
}

/// `hash(cmd) = lowercase_hex(SHA-256(cmd_bytes))`.
pub fn hash_command(cmd: &str) -> String {
    let digest = Sha256::digest(cmd.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_64_lowercase_hex_chars() {
        let h = hash_command("git status");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_command("ls -la"), hash_command("ls -la"));
        assert_ne!(hash_command("ls -la"), hash_command("ls -l"));
    }

    #[test]
    fn rank_clamps_recency_to_one_day_minimum() {
        // last_used_at in the future (clock skew) must not blow up the rank.
        let r = rank(1, 100, 0);
        assert_eq!(r, ALPHA + BETA / 1.0);
    }

    #[test]
    fn rank_clamps_recency_to_max_days() {
        let ten_years = 10 * 365 * SECONDS_PER_DAY;
        let r = rank(1, 0, ten_years);
        assert_eq!(r, ALPHA + BETA / MAX_DAYS as f64);
    }

    #[test]
    fn rank_is_monotone_in_frequency() {
        let now = 1_000_000;
        assert!(rank(5, now, now) < rank(6, now, now));
    }

    #[test]
    fn rank_is_monotone_in_recency() {
        let now = 1_000_000;
        let older = rank(1, now - 10 * SECONDS_PER_DAY, now);
        let newer = rank(1, now - SECONDS_PER_DAY, now);
        assert!(older < newer);
    }

    #[test]
    fn high_frequency_old_command_can_rank_below_recent_low_frequency_one() {
        // git status: frequency 10, last used 365 days ago.
        let git_status = rank(10, 0, 365 * SECONDS_PER_DAY);
        assert!((git_status - 20.273_972_602_739_725).abs() < 1e-9);

        // npm install: frequency 3, last used now.
        let npm_install = rank(3, 1_000_000, 1_000_000);
        assert_eq!(npm_install, 106.0);

        assert!(npm_install > git_status);
    }
}
