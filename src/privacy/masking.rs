use crate::privacy::models::ContactInfo;

const PHONE_SENTINEL: &str = "***-***-****";
const EMAIL_SENTINEL: &str = "***@***";
const ADDRESS_SENTINEL: &str = "General area";
const MIN_PHONE_DIGITS: usize = 10;

/// Mask a phone number, keeping the area code and the last two digits.
/// Example: `(555) 123-4567` -> `555-***-**67`.
pub fn mask_phone(phone: &str) -> String {
    if phone.is_empty() {
        return String::new();
    }

    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return PHONE_SENTINEL.to_string();
    }

    let area: String = digits.iter().take(3).collect();
    let tail: String = digits.iter().skip(digits.len() - 2).collect();
    format!("{area}-***-**{tail}")
}

/// Mask a display name.
/// Example: `Jane Doe` -> `Jane D.`, `Madonna` -> `Madonn*`.
pub fn mask_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.as_slice() {
        [] => "*".to_string(),
        [single] => {
            let count = single.chars().count();
            let kept: String = single.chars().take(count - 1).collect();
            format!("{kept}*")
        }
        [first, .., last] => {
            let initial = last.chars().next().unwrap_or('*');
            format!("{first} {initial}.")
        }
    }
}

/// Mask a street address down to the street name and locality.
/// Example: `42 Harbor Road, Springfield` -> `Harbor Road area, Springfield`.
pub fn mask_address(address: &str) -> String {
    if address.is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() < 2 {
        return ADDRESS_SENTINEL.to_string();
    }

    let street: Vec<&str> = parts[0].split_whitespace().skip(1).collect();
    let street = if street.is_empty() {
        "Street".to_string()
    } else {
        street.join(" ")
    };
    let locality = parts[parts.len() - 1].trim();

    format!("{street} area, {locality}")
}

/// Mask the local part of an email address, keeping the domain.
/// Example: `jane.doe@example.org` -> `ja***@example.org`.
pub fn mask_email(email: &str) -> String {
    if email.is_empty() {
        return String::new();
    }

    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = match parts.next() {
        Some(d) if !d.is_empty() => d,
        _ => return EMAIL_SENTINEL.to_string(),
    };

    if local.chars().count() <= 2 {
        return format!("**@{domain}");
    }

    let prefix: String = local.chars().take(2).collect();
    format!("{prefix}***@{domain}")
}

/// Derive the public tier from the private tier, field by field.
pub fn mask_data(raw: &ContactInfo) -> ContactInfo {
    ContactInfo {
        name: mask_name(&raw.name),
        address: mask_address(&raw.address),
        phone: mask_phone(&raw.phone),
        email: mask_email(&raw.email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_area_code_and_last_two() {
        assert_eq!(mask_phone("5551234567"), "555-***-**67");
        assert_eq!(mask_phone("(555) 123-4567"), "555-***-**67");
        assert_eq!(mask_phone("+1 555 123 4567"), "155-***-**67");
    }

    #[test]
    fn phone_short_or_garbage_gets_sentinel() {
        assert_eq!(mask_phone("12345"), "***-***-****");
        assert_eq!(mask_phone("call me"), "***-***-****");
        assert_eq!(mask_phone(""), "");
    }

    #[test]
    fn name_two_tokens() {
        assert_eq!(mask_name("Jane Doe"), "Jane D.");
        assert_eq!(mask_name("Mary Ann Smith"), "Mary S.");
        assert_eq!(mask_name("José Ñúñez"), "José Ñ.");
    }

    #[test]
    fn name_single_token() {
        assert_eq!(mask_name("Madonna"), "Madonn*");
        assert_eq!(mask_name("A"), "*");
        assert_eq!(mask_name(""), "");
        assert_eq!(mask_name("   "), "*");
    }

    #[test]
    fn address_with_locality() {
        assert_eq!(
            mask_address("42 Harbor Road, Springfield"),
            "Harbor Road area, Springfield"
        );
        assert_eq!(
            mask_address("7 Elm St, Apt 3, Riverside "),
            "Elm St area, Riverside"
        );
    }

    #[test]
    fn address_without_street_name() {
        assert_eq!(mask_address("42, Springfield"), "Street area, Springfield");
        assert_eq!(mask_address(", Springfield"), "Street area, Springfield");
    }

    #[test]
    fn address_without_comma() {
        assert_eq!(mask_address("42 Harbor Road"), "General area");
        assert_eq!(mask_address(""), "");
    }

    #[test]
    fn email_variants() {
        assert_eq!(mask_email("jane.doe@example.org"), "ja***@example.org");
        assert_eq!(mask_email("jo@example.org"), "**@example.org");
        assert_eq!(mask_email("@example.org"), "**@example.org");
        assert_eq!(mask_email("no-at-sign"), "***@***");
        assert_eq!(mask_email("trailing@"), "***@***");
        assert_eq!(mask_email(""), "");
    }

    #[test]
    fn mask_data_maps_every_field() {
        let raw = ContactInfo {
            name: "Jane Doe".to_string(),
            address: "42 Harbor Road, Springfield".to_string(),
            phone: "5551234567".to_string(),
            email: "jane.doe@example.org".to_string(),
        };
        let masked = mask_data(&raw);
        assert_eq!(masked.name, "Jane D.");
        assert_eq!(masked.address, "Harbor Road area, Springfield");
        assert_eq!(masked.phone, "555-***-**67");
        assert_eq!(masked.email, "ja***@example.org");
    }

    #[test]
    fn remasking_masked_data_does_not_panic() {
        let raw = ContactInfo {
            name: "Jane Doe".to_string(),
            address: "42 Harbor Road, Springfield".to_string(),
            phone: "5551234567".to_string(),
            email: "jane.doe@example.org".to_string(),
        };
        let once = mask_data(&raw);
        let twice = mask_data(&once);
        assert_eq!(twice.phone, "***-***-****");
        assert_eq!(twice.name, "Jane D.");
        assert!(!twice.email.is_empty());
    }
}
