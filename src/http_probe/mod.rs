pub mod probe;
pub mod result;

pub mod prelude {
    pub use super::probe::probe_url;
    pub use super::result::{NO_RESPONSE_STATUS, NewProbeResult, ProbeOutcome, ProbeResult};
}

use std::fmt::Write;

use unicode_truncate::UnicodeTruncateStr;

/// Upper bound, in display columns, for a stored failure reason.
pub const MAX_ERROR_MESSAGE_WIDTH: usize = 1024;

fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}

/// Turns a transport error into the reason stored with a failed probe.
/// Never returns an empty string.
pub(crate) fn failure_reason(err: &(dyn std::error::Error + 'static)) -> String {
    let full = report(err);
    let (truncated, _) = full.trim().unicode_truncate(MAX_ERROR_MESSAGE_WIDTH);
    if truncated.is_empty() {
        "unknown probe failure".to_string()
    } else {
        truncated.to_string()
    }
}
