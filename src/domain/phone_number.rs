const MIN_DIGITS: usize = 3;
const MAX_DIGITS: usize = 15;

/// A phone number as the SMS gateway understands it: an optional leading `+`
/// followed by digits only. Short codes such as `1000` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(number: String) -> Result<PhoneNumber, String> {
        let trimmed = number.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let only_digits = !digits.is_empty() && digits.chars().all(|char| char.is_ascii_digit());
        let valid_length = (MIN_DIGITS..=MAX_DIGITS).contains(&digits.len());

        if !only_digits || !valid_length {
            return Err(format!("{} is not a valid phone number", number));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::parse(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.0
    }
}
