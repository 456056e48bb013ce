//! Validation helpers shared by HTTP DTOs, room settings and real-time commands.

use validator::ValidationError;

/// Longest accepted participant name.
pub const MAX_NAME_LEN: usize = 50;
/// Longest accepted room key.
pub const MAX_ROOM_KEY_LEN: usize = 32;
/// Longest accepted ticket id prefix.
pub const MAX_TICKET_PREFIX_LEN: usize = 12;
/// Most estimate options a deck may carry.
pub const MAX_ESTIMATE_OPTIONS: usize = 30;
/// Longest single estimate option or vote value.
pub const MAX_ESTIMATE_LEN: usize = 16;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Participant names are trimmed, 1 to 50 characters, without control characters.
///
/// ```ignore
/// validate_participant_name("Alice")   // Ok
/// validate_participant_name("   ")     // Err - empty
/// ```
pub fn validate_participant_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(error(
            "name_length",
            format!("Name must be between 1 and {MAX_NAME_LEN} characters (got {len})"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(error(
            "name_format",
            "Name must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Room keys are 1 to 32 ASCII letters, digits, `-` or `_`.
pub fn validate_room_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() || key.len() > MAX_ROOM_KEY_LEN {
        return Err(error(
            "room_key_length",
            format!(
                "Room key must be between 1 and {MAX_ROOM_KEY_LEN} characters (got {})",
                key.len()
            ),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(error(
            "room_key_format",
            "Room key must contain only letters, digits, '-' or '_'".to_string(),
        ));
    }
    Ok(())
}

/// Ticket prefixes are 1 to 12 ASCII letters or digits.
pub fn validate_ticket_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() || prefix.len() > MAX_TICKET_PREFIX_LEN {
        return Err(error(
            "ticket_prefix_length",
            format!("Ticket prefix must be between 1 and {MAX_TICKET_PREFIX_LEN} characters"),
        ));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(error(
            "ticket_prefix_format",
            "Ticket prefix must contain only letters and digits".to_string(),
        ));
    }
    Ok(())
}

/// A deck holds 1 to 30 distinct, non-empty options of at most 16 characters.
pub fn validate_estimate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.is_empty() || options.len() > MAX_ESTIMATE_OPTIONS {
        return Err(error(
            "estimate_options_count",
            format!("Between 1 and {MAX_ESTIMATE_OPTIONS} estimate options are required"),
        ));
    }
    for (index, option) in options.iter().enumerate() {
        let len = option.trim().chars().count();
        if len == 0 || len > MAX_ESTIMATE_LEN {
            return Err(error(
                "estimate_option_length",
                format!("Estimate option #{index} must be between 1 and {MAX_ESTIMATE_LEN} characters"),
            ));
        }
        if options[..index].iter().any(|other| other == option) {
            return Err(error(
                "estimate_option_duplicate",
                format!("Estimate option `{option}` is listed twice"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_names() {
        assert!(validate_participant_name("Alice").is_ok());
        assert!(validate_participant_name("  Bob  ").is_ok());
        assert!(validate_participant_name(&"x".repeat(50)).is_ok());
        assert!(validate_participant_name("").is_err());
        assert!(validate_participant_name("   ").is_err());
        assert!(validate_participant_name(&"x".repeat(51)).is_err());
        assert!(validate_participant_name("tab\tname").is_err());
    }

    #[test]
    fn room_keys() {
        assert!(validate_room_key("R1").is_ok());
        assert!(validate_room_key("team-alpha_2").is_ok());
        assert!(validate_room_key("").is_err());
        assert!(validate_room_key("has space").is_err());
        assert!(validate_room_key(&"k".repeat(33)).is_err());
    }

    #[test]
    fn ticket_prefixes() {
        assert!(validate_ticket_prefix("PROJ").is_ok());
        assert!(validate_ticket_prefix("").is_err());
        assert!(validate_ticket_prefix("PRO-J").is_err());
    }

    #[test]
    fn estimate_decks() {
        let deck = ["1", "2", "3", "5", "?"].map(String::from);
        assert!(validate_estimate_options(&deck).is_ok());
        assert!(validate_estimate_options(&[]).is_err());
        assert!(validate_estimate_options(&["1".into(), "1".into()]).is_err());
        assert!(validate_estimate_options(&["".into()]).is_err());
        assert!(validate_estimate_options(&["x".repeat(17)]).is_err());
    }
}
