//! Interception layer: transparent decorators around the page's network and
//! console primitives.
//!
//! Both decorators forward to the original first and keep its result; the
//! capture side channel runs afterwards and can never turn a success into a
//! failure or change what the caller receives.

pub mod console;
pub mod network;

pub use console::{ConsoleCapture, ConsoleRecorder, InterceptedConsole};
pub use network::{InterceptedTransport, NetworkMonitor, NetworkRecorder, PendingRequest};

/// Cuts a string to `max_chars` characters, appending `suffix` when it was cut.
pub(crate) fn truncate_chars(input: &str, max_chars: usize, suffix: &str) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &input[..byte_index], suffix),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4, "…"), "héll…");
        assert_eq!(truncate_chars("short", 10, "…"), "short");
        assert_eq!(truncate_chars("exact", 5, "…"), "exact");
    }
}
