use std::io;

use crate::error::HwError;

/// SCPI channel list in the form the DAQ970A accepts: `(@101,@102)`.
pub fn scan_list(channels: &[u16]) -> String {
    let body = channels
        .iter()
        .map(|ch| format!("@{ch}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("({body})")
}

/// Parse a channel list written by [`scan_list`]. Also accepts the
/// single-`@` form `(@101,102)`.
pub fn parse_scan_list(s: &str) -> Option<Vec<u16>> {
    let inner = s.trim().strip_prefix('(')?.strip_suffix(')')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|part| part.trim().trim_start_matches('@').parse::<u16>().ok())
        .collect()
}

/// Socket read/write timeouts surface as `WouldBlock` on Unix and `TimedOut`
/// on Windows; both mean the instrument did not answer in time.
pub fn classify_io(e: io::Error) -> HwError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => HwError::Timeout,
        _ => HwError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_list_prefixes_every_channel() {
        assert_eq!(scan_list(&[304, 305]), "(@304,@305)");
        assert_eq!(scan_list(&[]), "()");
    }

    #[test]
    fn parse_accepts_both_forms() {
        assert_eq!(parse_scan_list("(@304,@305)"), Some(vec![304, 305]));
        assert_eq!(parse_scan_list(" (@101,102) "), Some(vec![101, 102]));
        assert_eq!(parse_scan_list("()"), Some(vec![]));
        assert_eq!(parse_scan_list("(@1,x)"), None);
        assert_eq!(parse_scan_list("@1"), None);
    }

    #[test]
    fn timeouts_are_classified() {
        let e = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(classify_io(e), HwError::Timeout));
        let e = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(classify_io(e), HwError::Io(_)));
    }
}
