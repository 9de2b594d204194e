//! Pure field validators for the intake conversation. Validation failure is
//! never fatal; the state machine re-prompts in place.

/// Phone numbers must carry this prefix after normalization.
const PHONE_COUNTRY_CODE: &str = "998";
const PHONE_SUBSCRIBER_DIGITS: usize = 9;
const MIN_ADDRESS_CHARS: usize = 10;
const MIN_BODY_CHARS: usize = 10;

/// At least two whitespace-separated tokens, none containing a digit.
pub fn valid_full_name(name: &str) -> bool {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    words
        .iter()
        .all(|word| !word.chars().any(char::is_numeric))
}

/// Case-normalizes a national id before checking: `AB1234567`.
pub fn normalize_national_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Exactly two uppercase letters followed by seven digits.
pub fn valid_national_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 9
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

/// After stripping `+`, spaces and hyphens: the country code followed by
/// exactly nine digits.
pub fn valid_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect();
    cleaned.len() == PHONE_COUNTRY_CODE.len() + PHONE_SUBSCRIBER_DIGITS
        && cleaned.starts_with(PHONE_COUNTRY_CODE)
        && cleaned.chars().all(|c| c.is_ascii_digit())
}

/// Cheap non-trivial check, not a geocoding validation.
pub fn valid_address(address: &str) -> bool {
    address.trim().chars().count() >= MIN_ADDRESS_CHARS
}

pub fn valid_body(body: &str) -> bool {
    body.trim().chars().count() >= MIN_BODY_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_two_word_names_without_digits() {
        assert!(valid_full_name("Ali Valiyev"));
        assert!(valid_full_name("Aliyev Vali Akramovich"));
        assert!(valid_full_name("  Ali   Valiyev  "));
    }

    #[test]
    fn rejects_short_or_numeric_names() {
        assert!(!valid_full_name("Ali"));
        assert!(!valid_full_name(""));
        assert!(!valid_full_name("Ali Val1yev"));
        assert!(!valid_full_name("User 42"));
        // digits in any script count as digits
        assert!(!valid_full_name("Ali ١٢٣"));
        assert!(!valid_full_name("Ali Valiyev٣"));
    }

    #[test]
    fn national_id_requires_two_letters_and_seven_digits() {
        assert!(valid_national_id("AB1234567"));
        assert!(!valid_national_id("ab1234567"));
        assert!(!valid_national_id("A1234567"));
        assert!(!valid_national_id("AB123456"));
        assert!(!valid_national_id("AB12345678"));
        assert!(!valid_national_id("1B1234567"));
        assert!(!valid_national_id(""));
    }

    #[test]
    fn national_id_normalization_uppercases_input() {
        assert!(valid_national_id(&normalize_national_id("ab1234567")));
        assert!(valid_national_id(&normalize_national_id("  Ab1234567 ")));
    }

    #[test]
    fn phone_accepts_prefixed_and_separated_forms() {
        assert!(valid_phone("+998901234567"));
        assert!(valid_phone("998901234567"));
        assert!(valid_phone("+998 90 123-45-67"));
    }

    #[test]
    fn phone_rejects_wrong_prefix_or_length() {
        assert!(!valid_phone("+7901234567"));
        assert!(!valid_phone("+99890123456"));
        assert!(!valid_phone("+9989012345678"));
        assert!(!valid_phone("998abc234567"));
        assert!(!valid_phone(""));
    }

    #[test]
    fn address_and_body_enforce_minimum_length() {
        assert!(valid_address("Tashkent city, block 5"));
        assert!(!valid_address("Tashkent"));
        assert!(valid_body("My water pipe is broken"));
        assert!(!valid_body("broken"));
        // whitespace padding does not count
        assert!(!valid_address("short        "));
    }
}
