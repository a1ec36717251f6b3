use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    deck::{Face, Rank, Suit},
    DealerError, Result,
};

/// Language used for spoken announcements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Es];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    /// Human readable card name, e.g. "A of Spades" or "As de Picas".
    pub fn announcement(self, face: Face) -> String {
        match self {
            Language::En => format!("{} of {}", face.rank.symbol(), suit_name_en(face.suit)),
            Language::Es => format!("{} de {}", rank_name_es(face.rank), suit_name_es(face.suit)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = DealerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            other => Err(DealerError::UnknownLanguage(other.to_string())),
        }
    }
}

fn suit_name_en(suit: Suit) -> &'static str {
    match suit {
        Suit::Spades => "Spades",
        Suit::Hearts => "Hearts",
        Suit::Diamonds => "Diamonds",
        Suit::Clubs => "Clubs",
    }
}

fn suit_name_es(suit: Suit) -> &'static str {
    match suit {
        Suit::Spades => "Picas",
        Suit::Hearts => "Corazones",
        Suit::Diamonds => "Diamantes",
        Suit::Clubs => "Tréboles",
    }
}

fn rank_name_es(rank: Rank) -> &'static str {
    match rank {
        Rank::Ace => "As",
        Rank::Two => "Dos",
        Rank::Three => "Tres",
        Rank::Four => "Cuatro",
        Rank::Five => "Cinco",
        Rank::Six => "Seis",
        Rank::Seven => "Siete",
        Rank::Eight => "Ocho",
        Rank::Nine => "Nueve",
        Rank::Ten => "Diez",
        Rank::Jack => "Jota",
        Rank::Queen => "Reina",
        Rank::King => "Rey",
    }
}

/// Remote service that synthesises announcement audio.
///
/// Implementations return the encoded bytes exactly as the service produced
/// them; decoding happens in the cache.
#[async_trait]
pub trait AnnouncementGenerator: Send + Sync {
    async fn generate(&self, text: &str, language: Language) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_english_and_spanish_names() {
        let face = Face::new(Rank::Ace, Suit::Spades);
        assert_eq!(Language::En.announcement(face), "A of Spades");
        assert_eq!(Language::Es.announcement(face), "As de Picas");

        let face = Face::new(Rank::Ten, Suit::Clubs);
        assert_eq!(Language::En.announcement(face), "10 of Clubs");
        assert_eq!(Language::Es.announcement(face), "Diez de Tréboles");
    }

    #[test]
    fn parses_language_codes() {
        assert_eq!("ES".parse::<Language>().unwrap(), Language::Es);
        assert_eq!(" en ".parse::<Language>().unwrap(), Language::En);
        let err = "fr".parse::<Language>().unwrap_err();
        assert!(format!("{err}").contains("fr"));
    }
}
