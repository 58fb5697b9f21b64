//! Human-readable error descriptions and structured JSON error formatting.

use windbal_core::{AcqError, DecodeError};

/// Exit code for configuration problems (unreadable, unparsable or invalid).
pub const EXIT_CONFIG: i32 = 3;
/// Exit code for instrument connection failures and link loss.
pub const EXIT_INSTRUMENT: i32 = 4;

/// First error of type `T` anywhere in the report's chain.
fn find<T: std::error::Error + 'static>(err: &eyre::Report) -> Option<&T> {
    err.chain().find_map(|e| e.downcast_ref::<T>())
}

fn is_config_error(err: &eyre::Report) -> bool {
    if matches!(find::<AcqError>(err), Some(AcqError::Config(_))) {
        return true;
    }
    err.chain().any(|e| {
        let m = e.to_string();
        m.starts_with("invalid configuration")
            || m.starts_with("parse config")
            || m.starts_with("read config")
    })
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ae) = find::<AcqError>(err) {
        return match ae {
            AcqError::Connection(msg) => format!(
                "What happened: Lost or could not open the instrument link ({msg}).\nLikely causes: Wrong [instrument].address, instrument powered off, or another client holding the SCPI socket.\nHow to fix: Check the address and network, close other sessions, or run with --sim to test without hardware."
            ),
            AcqError::LayoutMismatch { expected, found } => format!(
                "What happened: Scan returned {found} readings but {expected} channels are configured.\nLikely causes: The instrument scan list differs from [channels].\nHow to fix: Reconnect so the scan list is pushed again, and check the channel numbers exist on the installed cards."
            ),
            AcqError::Decode(de) => humanize_decode(de),
            AcqError::ConfigurationBusy => "What happened: Configuration was changed while a session was running.\nLikely causes: Channel or sink change issued without stopping first.\nHow to fix: Stop the session, apply the change, then start again.".to_string(),
            AcqError::InvalidStateTransition { op, state } => format!(
                "What happened: Cannot {op} while the session is {state}.\nLikely causes: Commands issued out of order.\nHow to fix: Check the session state before issuing the command."
            ),
            AcqError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or conflicting values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/windbal.toml for a sample."
            ),
        };
    }

    if let Some(de) = find::<DecodeError>(err) {
        return humanize_decode(de);
    }

    let msg = err.to_string();
    if is_config_error(err) {
        let detail = err
            .chain()
            .last()
            .map(ToString::to_string)
            .unwrap_or_else(|| msg.clone());
        return format!(
            "What happened: {msg} ({detail}).\nLikely causes: Missing file, TOML syntax error, or out-of-range values.\nHow to fix: Edit the config file (or pass --config), then rerun."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn humanize_decode(de: &DecodeError) -> String {
    format!(
        "What happened: Instrument response could not be decoded ({de}).\nLikely causes: Time stamps not enabled, or a truncated reply.\nHow to fix: Reconnect so FORM:READ:TIME is re-sent; check the link for dropped bytes."
    )
}

/// Stable exit codes: 3 config, 4 instrument, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if is_config_error(err) {
        return EXIT_CONFIG;
    }
    if matches!(find::<AcqError>(err), Some(AcqError::Connection(_))) {
        return EXIT_INSTRUMENT;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if is_config_error(err) {
        return "Config";
    }
    match find::<AcqError>(err) {
        Some(AcqError::Connection(_)) => "Connection",
        Some(AcqError::Decode(_)) => "Decode",
        Some(AcqError::LayoutMismatch { .. }) => "LayoutMismatch",
        Some(AcqError::ConfigurationBusy) => "ConfigurationBusy",
        Some(AcqError::InvalidStateTransition { .. }) => "InvalidStateTransition",
        Some(AcqError::Config(_)) => "Config",
        None if find::<DecodeError>(err).is_some() => "Decode",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    fn wrapped(e: AcqError) -> eyre::Report {
        Err::<(), _>(eyre::Report::new(e))
            .wrap_err("acquisition faulted after 3 samples")
            .unwrap_err()
    }

    #[test]
    fn connection_maps_to_instrument_code() {
        let err = wrapped(AcqError::Connection("I/O: reset".into()));
        assert_eq!(exit_code_for_error(&err), EXIT_INSTRUMENT);
        assert!(humanize(&err).contains("instrument link"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Connection");
    }

    #[test]
    fn config_messages_map_to_config_code() {
        let err = eyre::eyre!("channels: at least one channel must be configured")
            .wrap_err("invalid configuration in etc/windbal.toml");
        assert_eq!(exit_code_for_error(&err), EXIT_CONFIG);
        assert!(humanize(&err).contains("at least one channel"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Config");
    }

    #[test]
    fn typed_config_error_maps_to_config_code() {
        let err = wrapped(AcqError::Config("no channels".into()));
        assert_eq!(exit_code_for_error(&err), EXIT_CONFIG);
    }

    #[test]
    fn other_errors_are_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
    }
}
