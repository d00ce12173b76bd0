//! Reply presentation
//!
//! A reply has two channels: something short enough to speak, and the full
//! text for the console. `Responder` is the sink for both.

use std::sync::Mutex;

use crate::config::GeneralSettings;

/// Spoken instead of replies that are too long to read aloud
pub const LONG_OUTPUT_NOTICE: &str = "Done. Output is long; see console for details.";

const SPEECH_OVERFLOW_SUFFIX: &str = " ... I provided more details to the console.";

/// Display text beyond this is cut
pub const DISPLAY_MAX_CHARS: usize = 5000;

pub trait Responder: Send + Sync {
    /// Short, speakable text
    fn say(&self, text: &str);

    /// Full detail for the console
    fn show(&self, text: &str);
}

/// Cap a reply at `max_words` words for speech
pub fn format_for_speech(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}{}", words[..max_words].join(" "), SPEECH_OVERFLOW_SUFFIX)
}

/// Full text, cut at `DISPLAY_MAX_CHARS`
pub fn format_for_display(text: &str) -> String {
    match text.char_indices().nth(DISPLAY_MAX_CHARS) {
        Some((idx, _)) => format!("{}\n\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Send a final reply through both channels
pub fn present(responder: &dyn Responder, text: &str, settings: &GeneralSettings) {
    if text.chars().count() > settings.effective_long_output_chars() {
        responder.show(&format_for_display(text));
        responder.say(LONG_OUTPUT_NOTICE);
        return;
    }

    let speech = format_for_speech(text, settings.effective_speech_max_words());
    if speech != text {
        responder.show(&format_for_display(text));
    }
    responder.say(&speech);
}

/// Keeps everything it is given; for tests
#[derive(Debug, Default)]
pub struct RecordingResponder {
    said: Mutex<Vec<String>>,
    shown: Mutex<Vec<String>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

impl Responder for RecordingResponder {
    fn say(&self, text: &str) {
        self.said.lock().unwrap().push(text.to_string());
    }

    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_under_limit_unchanged() {
        assert_eq!(format_for_speech("vim is already installed.", 60), "vim is already installed.");
    }

    #[test]
    fn test_speech_over_limit_capped() {
        let text = (0..80).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let speech = format_for_speech(&text, 60);
        assert!(speech.starts_with("0 1 2"));
        assert!(speech.contains(" 59 ..."));
        assert!(!speech.contains(" 60 "));
        assert!(speech.ends_with("I provided more details to the console."));
    }

    #[test]
    fn test_display_truncation() {
        let text = "x".repeat(DISPLAY_MAX_CHARS + 1);
        let shown = format_for_display(&text);
        assert!(shown.ends_with("\n\n[truncated]"));
        assert_eq!(format_for_display("short"), "short");
    }

    #[test]
    fn test_present_long_output() {
        let responder = RecordingResponder::new();
        let text = "y".repeat(600);
        present(&responder, &text, &GeneralSettings::default());
        assert_eq!(responder.said(), vec![LONG_OUTPUT_NOTICE.to_string()]);
        assert_eq!(responder.shown(), vec![text]);
    }

    #[test]
    fn test_present_short_output() {
        let responder = RecordingResponder::new();
        present(&responder, "Launched gimp.", &GeneralSettings::default());
        assert_eq!(responder.said(), vec!["Launched gimp.".to_string()]);
        assert!(responder.shown().is_empty());
    }

    #[test]
    fn test_present_wordy_output_shows_details() {
        let responder = RecordingResponder::new();
        let text = vec!["word"; 70].join(" ");
        present(&responder, &text, &GeneralSettings::default());
        assert_eq!(responder.shown(), vec![text]);
        assert!(responder.said()[0].ends_with("console."));
    }
}
