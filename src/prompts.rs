//! System prompts for vision-model OCR.
//!
//! All prompt text lives here so the retry and parsing logic in
//! [`crate::ocr::vision`] never has to change when wording does, and so
//! tests can inspect prompts without calling a model.
//!
//! Callers can override [`DEFAULT_OCR_PROMPT`] via
//! [`crate::config::PrepConfig::system_prompt`].

/// Default system prompt for transcribing a preprocessed image.
pub const DEFAULT_OCR_PROMPT: &str = r#"You are an optical character recognition engine. Transcribe every piece of text visible in the image.

Rules:

1. Output ONLY the text that appears in the image, in natural reading order (top to bottom, left to right).
2. Keep one output line per visual line of text.
3. Do not translate, summarise, correct spelling, or add commentary.
4. Do not wrap the output in code fences or quotes.
5. If the image contains no legible text, output nothing at all."#;

/// System prompt for word-level boxes.
pub const WORD_BOX_PROMPT: &str = r#"You are an optical character recognition engine that reports word positions.

Return a JSON array and nothing else. Each element describes one word:

{"text": "<word>", "left": <int>, "top": <int>, "width": <int>, "height": <int>, "confidence": <number 0-100>}

Rules:

1. Coordinates are pixels from the top-left corner of the image.
2. "confidence" is your certainty that the word is read correctly, from 0 to 100.
3. If the image contains no legible text, return [].
4. Do not wrap the JSON in code fences or add commentary."#;

/// Extra system message naming the expected language.
///
/// `lang` is an ISO 639-2 code such as `eng` or `deu`; codes joined with `+`
/// (`eng+fra`) list several languages.
pub fn language_hint(lang: &str) -> String {
    let langs: Vec<&str> = lang
        .split('+')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match langs.as_slice() {
        [] => String::new(),
        [one] => format!("The text is expected to be in language '{one}'."),
        many => format!(
            "The text is expected to be in one of these languages: {}.",
            many.iter()
                .map(|l| format!("'{l}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
