/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// Errors that can occur when creating a validated case identifier.
#[derive(Debug, thiserror::Error)]
pub enum CaseIdError {
    /// The input was empty or contained only whitespace
    #[error("Case identifier cannot be empty")]
    Empty,
    /// The input exceeded the maximum identifier length
    #[error("Case identifier exceeds {MAX_CASE_ID_LEN} characters")]
    TooLong,
    /// The input contained a character outside the allowed set
    #[error("Case identifier may only contain ASCII letters, digits, '-' and '_'")]
    InvalidCharacter,
}

/// Maximum accepted length for a laboratory case identifier.
pub const MAX_CASE_ID_LEN: usize = 32;

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A validated laboratory case identifier (e.g. `LAB001`).
///
/// Case identifiers are assigned by the laboratory at intake and double as the
/// on-disk directory name for the case record, so the character set is
/// restricted to a conservative ASCII subset: letters, digits, `-` and `_`.
/// The input is trimmed before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId(String);

impl CaseId {
    /// Creates a new `CaseId` from the given input.
    ///
    /// # Errors
    ///
    /// Returns a `CaseIdError` if the trimmed input is empty, longer than
    /// [`MAX_CASE_ID_LEN`] characters, or contains characters outside the
    /// allowed set.
    pub fn new(input: impl AsRef<str>) -> Result<Self, CaseIdError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CaseIdError::Empty);
        }
        if trimmed.len() > MAX_CASE_ID_LEN {
            return Err(CaseIdError::TooLong);
        }

        let ok = trimmed
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));
        if !ok {
            return Err(CaseIdError::InvalidCharacter);
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for CaseId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for CaseId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CaseId::new(&s).map_err(serde::de::Error::custom)
    }
}
