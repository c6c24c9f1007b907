//! Splitting a notation string into front matter, voices, measures and tokens.
//!
//! ```text
//! ---                 <- optional YAML front matter
//! tempo: 96
//! ---
//! V1: C4:q D4:q [Am/E]:h | G4:w      <- voice 1, two measures
//! V2: C3:w | G2:w                    <- voice 2
//! ```
//!
//! Lines without a `V<n>:` prefix continue the current voice (voice 1 until
//! a prefix appears). Measures split on `|`; within a measure, whitespace
//! separates tokens except inside `[...]`.

use crate::error::NotationError;

pub const MEASURE_DELIMITER: char = '|';

/// Text of one voice, lines joined with spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSource {
    pub voice: u8,
    pub text: String,
}

/// Split off a leading `---` ... `---` block.
///
/// Returns `(front_matter, body)`. An opening marker without a closing one
/// is an error.
pub fn split_front_matter(source: &str) -> Result<(Option<&str>, &str), NotationError> {
    let trimmed = source.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Ok((None, source));
    };
    let after_open = after_open.strip_prefix('\r').unwrap_or(after_open);
    let Some(after_open) = after_open.strip_prefix('\n') else {
        return Ok((None, source));
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err(NotationError::Metadata(
        "front matter opened with --- but never closed".to_string(),
    ))
}

fn voice_prefix(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let rest = line.strip_prefix('V').or_else(|| line.strip_prefix('v'))?;
    let (number, body) = rest.split_once(':')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((number, body))
}

/// Group body lines into voices, in order of first appearance.
pub fn split_voices(body: &str) -> Result<Vec<VoiceSource>, NotationError> {
    let mut voices: Vec<VoiceSource> = Vec::new();
    let mut current = 1u8;

    for line in body.lines() {
        let text = match voice_prefix(line) {
            Some((number, rest)) => {
                current = number
                    .parse::<u8>()
                    .ok()
                    .filter(|v| (1..=16).contains(v))
                    .ok_or_else(|| {
                        NotationError::Metadata(format!("voice V{} outside V1-V16", number))
                    })?;
                rest
            }
            None => line,
        };
        if text.trim().is_empty() {
            continue;
        }
        match voices.iter_mut().find(|v| v.voice == current) {
            Some(voice) => {
                voice.text.push(' ');
                voice.text.push_str(text.trim());
            }
            None => voices.push(VoiceSource {
                voice: current,
                text: text.trim().to_string(),
            }),
        }
    }
    Ok(voices)
}

/// Split a voice into measures. Empty leading and trailing segments (from
/// `| C4 |`) are dropped; empty segments in between are silent measures.
pub fn split_measures(text: &str) -> Vec<&str> {
    let mut measures: Vec<&str> = text.split(MEASURE_DELIMITER).map(str::trim).collect();
    while measures.last().is_some_and(|m| m.is_empty()) {
        measures.pop();
    }
    let leading = measures.iter().take_while(|m| m.is_empty()).count();
    measures.drain(..leading);
    measures
}

/// Bracket-aware whitespace split of one measure.
///
/// `measure` is 1-indexed and only used for errors.
pub fn split_tokens(measure_text: &str, measure: usize) -> Result<Vec<&str>, NotationError> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut open_at = 0usize;

    for (idx, c) in measure_text.char_indices() {
        match c {
            '[' => {
                if depth > 0 {
                    return Err(unbalanced(measure_text, open_at, measure, "nested '['"));
                }
                depth += 1;
                open_at = idx;
                start.get_or_insert(idx);
            }
            ']' => {
                if depth == 0 {
                    return Err(unbalanced(measure_text, idx, measure, "']' without '['"));
                }
                depth -= 1;
            }
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&measure_text[s..idx]);
                }
            }
            _ => {
                start.get_or_insert(idx);
            }
        }
    }

    if depth > 0 {
        return Err(unbalanced(measure_text, open_at, measure, "'[' is never closed"));
    }
    if let Some(s) = start {
        tokens.push(&measure_text[s..]);
    }
    Ok(tokens)
}

fn unbalanced(text: &str, at: usize, measure: usize, message: &str) -> NotationError {
    let token = text[at..]
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    NotationError::InvalidChord {
        token,
        measure,
        message: message.to_string(),
    }
}
