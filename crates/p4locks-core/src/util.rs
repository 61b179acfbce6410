//! Small helpers shared across modules.

use std::cmp::Ordering;

/// Orders pids numerically when both parse, falling back to string order.
///
/// Gives `9 < 10 < 100` instead of the lexical `10 < 100 < 9`, and keeps
/// non-numeric ids (cycle markers, `-1`) in a stable position.
pub fn compare_pids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Parses a server elapsed time (`HH:MM:SS`, `MM:SS` or plain seconds) into seconds.
///
/// Hours may exceed 24. Returns `None` for anything else, including `"unknown"`.
pub fn parse_elapsed(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total: u64 = 0;
    let mut parts = 0;
    for part in s.split(':') {
        parts += 1;
        if parts > 3 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(part.parse().ok()?)?;
    }
    Some(total)
}
