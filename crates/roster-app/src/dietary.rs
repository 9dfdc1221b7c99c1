// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Dietary requirements: a set of known tokens plus one free-text value that
//! only exists while `other` is selected. Stored as one delimited string such
//! as `vegan, gluten-free, other: no mushrooms`.

use serde::{Deserialize, Serialize};

pub const DIETARY_DELIMITER: char = ',';
const OTHER_PREFIX: &str = "other:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DietaryToken {
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    NutAllergy,
    Halal,
    Kosher,
    Other,
}

impl DietaryToken {
    pub const ALL: [Self; 8] = [
        Self::Vegetarian,
        Self::Vegan,
        Self::GlutenFree,
        Self::DairyFree,
        Self::NutAllergy,
        Self::Halal,
        Self::Kosher,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vegetarian => "vegetarian",
            Self::Vegan => "vegan",
            Self::GlutenFree => "gluten-free",
            Self::DairyFree => "dairy-free",
            Self::NutAllergy => "nut-allergy",
            Self::Halal => "halal",
            Self::Kosher => "kosher",
            Self::Other => "other",
        }
    }

    /// Case-insensitive match against the stored token.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|token| token.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DietarySelection {
    tokens: Vec<DietaryToken>,
    other_text: String,
}

impl DietarySelection {
    /// Everything after an `other:` part is its free text, delimiters
    /// included, since the formatter always writes it last.
    pub fn parse(raw: &str) -> Self {
        let (head, other_text) = split_other_text(raw);
        let mut selection = Self::default();
        for part in head.split(DIETARY_DELIMITER).map(str::trim) {
            if part.is_empty() {
                continue;
            }

            if let Some(token) = DietaryToken::parse(part) {
                selection.select(token);
                continue;
            }

            if selection.contains(DietaryToken::Other) {
                if selection.other_text.is_empty() {
                    selection.other_text = part.to_owned();
                } else {
                    selection.other_text.push(DIETARY_DELIMITER);
                    selection.other_text.push(' ');
                    selection.other_text.push_str(part);
                }
            }
        }
        if let Some(text) = other_text {
            selection.select(DietaryToken::Other);
            selection.other_text = text.trim().to_owned();
        }
        selection
    }

    pub fn format(&self) -> String {
        let mut parts: Vec<String> = self
            .tokens
            .iter()
            .filter(|token| **token != DietaryToken::Other)
            .map(|token| token.as_str().to_owned())
            .collect();

        if self.contains(DietaryToken::Other) {
            match self.other_text() {
                Some(text) => parts.push(format!("{OTHER_PREFIX} {text}")),
                None => parts.push(DietaryToken::Other.as_str().to_owned()),
            }
        }
        parts.join(", ")
    }

    pub fn tokens(&self) -> &[DietaryToken] {
        &self.tokens
    }

    pub fn contains(&self, token: DietaryToken) -> bool {
        self.tokens.contains(&token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Free text, present only while `other` is selected and non-blank.
    pub fn other_text(&self) -> Option<&str> {
        if !self.contains(DietaryToken::Other) {
            return None;
        }
        let trimmed = self.other_text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    pub fn toggle(&mut self, token: DietaryToken) {
        if self.contains(token) {
            self.tokens.retain(|existing| *existing != token);
            if token == DietaryToken::Other {
                self.other_text.clear();
            }
        } else {
            self.tokens.push(token);
        }
    }

    /// Sets the free text; selecting `other` implicitly when text is given.
    pub fn set_other_text(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.select(DietaryToken::Other);
        }
        self.other_text = text.to_owned();
    }

    /// Token union of `self` followed by `other`. The free text of `self`
    /// wins when both carry one.
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for token in &other.tokens {
            merged.select(*token);
        }
        if merged.other_text().is_none()
            && let Some(text) = other.other_text()
        {
            merged.other_text = text.to_owned();
        }
        merged
    }

    fn select(&mut self, token: DietaryToken) {
        if !self.contains(token) {
            self.tokens.push(token);
        }
    }
}

/// Splits `raw` at the first `other:` part into the token list before it
/// and the free text after the prefix.
fn split_other_text(raw: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for piece in raw.split(DIETARY_DELIMITER) {
        let trimmed = piece.trim_start();
        if has_other_prefix(trimmed) {
            let text_start = offset + (piece.len() - trimmed.len()) + OTHER_PREFIX.len();
            return (&raw[..offset], Some(&raw[text_start..]));
        }
        offset += piece.len() + DIETARY_DELIMITER.len_utf8();
    }
    (raw, None)
}

fn has_other_prefix(part: &str) -> bool {
    part.get(..OTHER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(OTHER_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::{DietarySelection, DietaryToken};

    #[test]
    fn parse_is_case_insensitive_and_keeps_selection_order() {
        let selection = DietarySelection::parse(" Vegan ,GLUTEN-FREE, vegetarian");
        assert_eq!(
            selection.tokens(),
            &[
                DietaryToken::Vegan,
                DietaryToken::GlutenFree,
                DietaryToken::Vegetarian
            ]
        );
        assert_eq!(selection.format(), "vegan, gluten-free, vegetarian");
    }

    #[test]
    fn other_prefix_sets_token_and_text() {
        let selection = DietarySelection::parse("halal, Other: no mushrooms");
        assert!(selection.contains(DietaryToken::Other));
        assert_eq!(selection.other_text(), Some("no mushrooms"));
        assert_eq!(selection.format(), "halal, other: no mushrooms");
    }

    #[test]
    fn parts_after_other_text_stay_in_the_text() {
        let selection = DietarySelection::parse("other: no soy, vegan");
        assert_eq!(selection.tokens(), &[DietaryToken::Other]);
        assert_eq!(selection.other_text(), Some("no soy, vegan"));
        assert_eq!(selection.format(), "other: no soy, vegan");
    }

    #[test]
    fn unknown_parts_absorb_only_after_other() {
        let ignored = DietarySelection::parse("pescatarian, vegan");
        assert_eq!(ignored.format(), "vegan");

        let absorbed = DietarySelection::parse("other, low sodium");
        assert_eq!(absorbed.other_text(), Some("low sodium"));
        assert_eq!(absorbed.format(), "other: low sodium");
    }

    #[test]
    fn bare_other_formats_without_text() {
        let selection = DietarySelection::parse("kosher, other");
        assert_eq!(selection.other_text(), None);
        assert_eq!(selection.format(), "kosher, other");
    }

    #[test]
    fn formatter_output_round_trips() {
        let mut cases = Vec::new();
        for (index, token) in DietaryToken::ALL.into_iter().enumerate() {
            let mut selection = DietarySelection::default();
            selection.toggle(token);
            selection.toggle(DietaryToken::ALL[(index + 3) % DietaryToken::ALL.len()]);
            cases.push(selection.clone());
            selection.set_other_text("no raw onion");
            cases.push(selection);
        }
        let mut multi_part = DietarySelection::default();
        multi_part.set_other_text("no soy, no sesame");
        cases.push(multi_part);
        let mut token_in_text = DietarySelection::parse("halal");
        token_in_text.set_other_text("no soy, vegan,  Other: spicy");
        cases.push(token_in_text);
        cases.push(DietarySelection::default());

        for selection in cases {
            let formatted = selection.format();
            let reparsed = DietarySelection::parse(&formatted);
            assert_eq!(reparsed.format(), formatted, "from {selection:?}");
        }
    }

    #[test]
    fn toggling_other_off_drops_text() {
        let mut selection = DietarySelection::parse("other: shellfish");
        selection.toggle(DietaryToken::Other);
        assert_eq!(selection.other_text(), None);
        selection.toggle(DietaryToken::Other);
        assert_eq!(selection.format(), "other");
    }

    #[test]
    fn union_keeps_existing_order_and_text() {
        let existing = DietarySelection::parse("vegan, other: no garlic");
        let incoming = DietarySelection::parse("halal, vegan, other: no onion");
        assert_eq!(
            existing.union(&incoming).format(),
            "vegan, halal, other: no garlic"
        );
        assert_eq!(
            incoming.union(&existing).format(),
            "halal, vegan, other: no onion"
        );
    }
}
