//! Tells whether a sequence of consecutive IP ID values comes from a host with a global IPID counter.
//!
//! Idle scans need such a host. A global counter increases by a small amount between
//! two probes, anything else (no change, big jumps, going backwards) rules it out.

/// Largest increment between two consecutive IPIDs that still counts as sequential.
pub const IPID_DIFF_THRESHOLD: u16 = 10;

/// Checks if `next` follows `prev`, modulo 2^16.
pub fn is_sequential(prev: u16, next: u16) -> bool {
    let diff = next.wrapping_sub(prev);
    diff != 0 && diff <= IPID_DIFF_THRESHOLD
}

pub fn is_global_sequence(ipids: &[u16]) -> bool {
    ipids.windows(2).all(|pair| {
        let sequential = is_sequential(pair[0], pair[1]);
        if !sequential {
            log::debug!("IPID {} does not follow {}", pair[1], pair[0]);
        }
        sequential
    })
}

/// Parses one IPID per line.
///
/// Like `atoi`, only the leading integer of a line counts and garbage reads as 0,
/// blank lines included. Values are truncated to 16 bits.
pub fn parse_sequence(input: &str) -> Vec<u16> {
    input
        .lines()
        .map(str::trim_start)
        .map(|line| leading_integer(line) as u16)
        .collect()
}

fn leading_integer(line: &str) -> i64 {
    let (negative, digits) = match line.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, line.strip_prefix('+').unwrap_or(line)),
    };

    let value = digits
        .chars()
        .map_while(|c| c.to_digit(10))
        .fold(0i64, |acc, digit| acc.wrapping_mul(10).wrapping_add(digit as i64));

    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_steps() {
        assert!(is_sequential(10, 11));
        assert!(is_sequential(10, 20));
        assert!(!is_sequential(10, 21));
        assert!(!is_sequential(10, 10));
        assert!(!is_sequential(10, 9));
        assert!(is_sequential(65535, 3));
    }

    #[test]
    fn global_sequences() {
        assert!(is_global_sequence(&[10, 11, 12, 13]));
        assert!(!is_global_sequence(&[10, 11, 12, 50]));
        assert!(is_global_sequence(&[65534, 65535, 0, 1]));
        assert!(is_global_sequence(&[]));
        assert!(is_global_sequence(&[42]));
    }

    #[test]
    fn parse_like_atoi() {
        assert_eq!(parse_sequence("10\n11\n12\n"), vec![10, 11, 12]);
        assert_eq!(parse_sequence("10\n11\n\n12\n"), vec![10, 11, 0, 12]);
        assert_eq!(parse_sequence("  9\n"), vec![9]);
        assert_eq!(parse_sequence("7 extra\nabc\n65537\n"), vec![7, 0, 1]);
        assert_eq!(parse_sequence("-1\n+5\n"), vec![65535, 5]);
    }

    #[test]
    fn parse_extreme_values() {
        assert_eq!(parse_sequence("-9223372036854775808\n"), vec![0]);
        assert_eq!(parse_sequence("99999999999999999999999\n"), vec![65535]);
    }

    #[test]
    fn blank_line_breaks_sequence() {
        assert!(!is_global_sequence(&parse_sequence("10\n11\n\n12\n")));
    }
}
