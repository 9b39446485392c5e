//! Translation prompt and response handling shared by the LLM backends

/// Build the instruction sent to the model
pub fn translation_prompt(source_language: &str, target_language: &str, text: &str) -> String {
    format!(
        "Translate the following {} text to {}. Only return the translated text, \
         with no additional explanation or context: \"{}\"",
        source_language, target_language, text
    )
}

/// Normalise model output into the bare translation
///
/// Trims whitespace and drops one pair of wrapping quotes, which models tend to
/// copy from the prompt.
pub fn clean_translation(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '“', '„', '«']
        .iter()
        .zip(['"', '”', '“', '»'])
        .find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(close))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
