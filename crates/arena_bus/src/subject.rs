//! Subject grammar: validation and wildcard matching.
//!
//! Subjects are non-empty, dot-separated tokens. Tokens may not contain
//! whitespace. Patterns additionally allow `*` (exactly one token) and `>`
//! (one or more trailing tokens, only valid as the last token). Literal
//! subjects used for publishing may not contain wildcards at all.

use crate::error::BusError;

const SINGLE_WILDCARD: &str = "*";
const TAIL_WILDCARD: &str = ">";

fn invalid(subject: &str, reason: &'static str) -> BusError {
    BusError::InvalidSubject {
        subject: subject.to_string(),
        reason,
    }
}

fn check_tokens(subject: &str) -> Result<(), BusError> {
    if subject.is_empty() {
        return Err(invalid(subject, "subject is empty"));
    }
    for token in subject.split('.') {
        if token.is_empty() {
            return Err(invalid(subject, "empty token"));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(invalid(subject, "whitespace in token"));
        }
    }
    Ok(())
}

/// Validates a subject used for publishing or requesting.
pub fn validate_literal(subject: &str) -> Result<(), BusError> {
    check_tokens(subject)?;
    if subject
        .split('.')
        .any(|t| t.contains('*') || t.contains('>'))
    {
        return Err(invalid(subject, "wildcards are not allowed when publishing"));
    }
    Ok(())
}

/// Validates a subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    check_tokens(pattern)?;
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        let has_wildcard = token.contains('*') || token.contains('>');
        if !has_wildcard {
            continue;
        }
        match *token {
            SINGLE_WILDCARD => {}
            TAIL_WILDCARD if i == last => {}
            TAIL_WILDCARD => return Err(invalid(pattern, "'>' must be the last token")),
            _ => return Err(invalid(pattern, "wildcards must occupy a whole token")),
        }
    }
    Ok(())
}

/// Returns true when `token` can be embedded as one token of a subject.
///
/// Used to vet identifiers coming from untrusted clients before they are
/// composed into subjects like `<gameId>.join`.
pub fn is_single_token(token: &str) -> bool {
    !token.is_empty()
        && !token.contains('.')
        && !token.contains('*')
        && !token.contains('>')
        && !token.chars().any(char::is_whitespace)
}

/// Checks whether a literal subject matches a (validated) pattern.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(TAIL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
