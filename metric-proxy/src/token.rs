use std::convert::Infallible;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, PartialEq)]
pub enum InvalidTokenReason {
    IsEmpty,
    NotWhitelisted,
}

impl InvalidTokenReason {
    pub fn reason(&self) -> &str {
        match *self {
            Self::IsEmpty => "empty",
            Self::NotWhitelisted => "not_whitelisted",
        }
    }
}

impl Display for InvalidTokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl Error for InvalidTokenReason {}

/// The set of project tokens we agree to forward events for, loaded once from
/// a comma-separated configuration value.
#[derive(Debug, Clone, Default)]
pub struct TokenWhitelist {
    tokens: Vec<String>,
}

impl TokenWhitelist {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TokenWhitelist {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|token: &String| !token.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Check a token against the whitelist.
    ///
    /// The mixpanel Swift 2.x library sends tokens as `Optional(<token>)`, so
    /// a token is accepted when any whitelisted token is contained in it.
    /// This also accepts any string that merely embeds a whitelisted token.
    pub fn validate(&self, token: Option<&str>) -> Result<(), InvalidTokenReason> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(InvalidTokenReason::IsEmpty),
        };

        if self
            .tokens
            .iter()
            .any(|whitelisted| token.contains(whitelisted.as_str()))
        {
            Ok(())
        } else {
            Err(InvalidTokenReason::NotWhitelisted)
        }
    }

    pub fn is_valid(&self, token: Option<&str>) -> bool {
        self.validate(token).is_ok()
    }
}

impl FromStr for TokenWhitelist {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TokenWhitelist::new(s.split(',').map(str::trim)))
    }
}
