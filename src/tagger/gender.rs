//! Performer gender values

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    TransgenderMale,
    TransgenderFemale,
    Intersex,
    NonBinary,
}

impl Gender {
    /// Every gender value, in display order
    pub fn all() -> Vec<Gender> {
        vec![
            Gender::Male,
            Gender::Female,
            Gender::TransgenderMale,
            Gender::TransgenderFemale,
            Gender::Intersex,
            Gender::NonBinary,
        ]
    }

    /// Parse a free-form gender string from a scraper
    ///
    /// Matching ignores case, spaces, dashes and underscores, and accepts the
    /// common short forms ("Trans Male", "Enby", "F").
    pub fn parse(value: &str) -> Option<Gender> {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "male" | "m" | "man" => Some(Gender::Male),
            "female" | "f" | "woman" => Some(Gender::Female),
            "transgendermale" | "transmale" | "transman" | "ftm" => Some(Gender::TransgenderMale),
            "transgenderfemale" | "transfemale" | "transwoman" | "mtf" => {
                Some(Gender::TransgenderFemale)
            }
            "intersex" => Some(Gender::Intersex),
            "nonbinary" | "enby" => Some(Gender::NonBinary),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::TransgenderMale => "Transgender Male",
            Gender::TransgenderFemale => "Transgender Female",
            Gender::Intersex => "Intersex",
            Gender::NonBinary => "Non-Binary",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
