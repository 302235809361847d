// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! String helpers shared by the column builder and the cell resolvers

/// Title-case a key for display: `isCorrect` -> `Is Correct`,
/// `gold_standard` -> `Gold Standard`.
///
/// Splits on `_`, `-`, `.`, whitespace and lower-to-upper camel boundaries.
pub fn title_case(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in raw.chars() {
        if ch == '_' || ch == '-' || ch == '.' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase and strip everything that is not alphanumeric.
///
/// Used for fuzzy key comparison: `is_correct`, `isCorrect` and `Is-Correct`
/// all canonicalize to `iscorrect`.
pub fn canonical_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Last dot-separated segment of a key path
pub fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Case-insensitive match of a step identifier against a slug candidate.
///
/// Matches on equality, or when the identifier ends with the candidate
/// behind a `.`, `-` or `_` separator (`run.exact_match` matches `exact_match`).
pub fn identifier_matches(identifier: &str, candidate: &str) -> bool {
    if identifier.is_empty() || candidate.is_empty() {
        return false;
    }
    let identifier = identifier.to_lowercase();
    let candidate = candidate.to_lowercase();
    if identifier == candidate {
        return true;
    }
    ['.', '-', '_'].iter().any(|sep| {
        identifier
            .strip_suffix(candidate.as_str())
            .is_some_and(|head| head.ends_with(*sep))
    })
}
