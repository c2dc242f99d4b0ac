// Text cleanup applied around provider calls
//
// OCR output from speech bubbles carries full-width punctuation, decorative
// bullets and ragged whitespace; provider output carries repeated
// punctuation and stray spacing.

const DECORATIONS: &[char] = &['•', '▪', '▫', '■', '□', '●', '○', '◆', '◇', '★', '☆'];

/// Clean OCR text before it is fingerprinted or sent to a provider
pub fn normalize_source(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !DECORATIONS.contains(c))
        .map(|c| match c {
            '．' | '。' => '.',
            '（' => '(',
            '）' => ')',
            '！' => '!',
            '？' => '?',
            '，' => ',',
            '：' => ':',
            '\u{3000}' => ' ',
            other => other,
        })
        .collect();

    collapse_whitespace(&mapped)
}

/// Post-process a provider translation for display in a bubble
pub fn polish_translation(text: &str) -> String {
    let text = collapse_whitespace(text);
    let text = text.replace("...", "…").replace("--", "—");

    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if matches!(c, '.' | '!' | '?' | '…') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short, log-safe preview of a credential
pub fn mask_credential(credential: &str) -> String {
    let visible: String = credential.chars().take(6).collect();
    if credential.chars().count() > 6 {
        format!("{}...", visible)
    } else {
        "***".to_string()
    }
}
