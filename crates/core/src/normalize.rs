//! Attribute normalisation applied before any lookup.
//!
//! Nothing here fails. Empty input produces empty output, and malformed national IDs pass
//! through untouched apart from case and whitespace.

use crate::model::RegistrationRequest;
use register_types::EmailAddress;

/// Request attributes in the form the matcher compares on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedAttributes {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub emails: Vec<EmailAddress>,
}

/// Splits the stated first and middle names into one first-name token and a middle remainder.
///
/// Tokens beyond the first in `first` are prepended to `middle`. A middle token repeating one
/// already taken (case-insensitively) is dropped, so a caller that sends `"Minnie Van"` /
/// `"Van"` gets `"Minnie"` / `"Van"` rather than `"Van Van"`.
pub fn split_names(first: &str, middle: &str) -> (String, String) {
    let mut tokens = first.split_whitespace().chain(middle.split_whitespace());
    let Some(first_token) = tokens.next() else {
        return (String::new(), String::new());
    };

    let mut seen: Vec<String> = Vec::new();
    let mut remainder: Vec<&str> = Vec::new();
    for token in tokens {
        let folded = token.to_lowercase();
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        remainder.push(token);
    }

    (first_token.to_owned(), remainder.join(" "))
}

/// Collapses internal whitespace runs and trims.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercases and removes all whitespace. Returns an empty string for blank input.
pub fn normalize_national_id(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalises every attribute of a request used by matching.
pub fn normalize(request: &RegistrationRequest) -> NormalizedAttributes {
    let (first_name, middle_name) = split_names(&request.first_name, &request.middle_name);

    let national_id = request
        .national_id
        .as_deref()
        .map(normalize_national_id)
        .filter(|id| !id.is_empty());

    let mut emails = request.emails.clone();
    emails.sort();
    emails.dedup();

    NormalizedAttributes {
        first_name,
        middle_name,
        last_name: collapse_whitespace(&request.last_name),
        national_id,
        emails,
    }
}
