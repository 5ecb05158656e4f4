/// Interpret an environment-style flag. `1`/`true`/`yes`/`on` and their negations are recognized, case-insensitively
/// and ignoring surrounding whitespace; anything else, including an unset value, falls back to `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else { return default };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognized_tokens() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_boolean_flag(Some(v.into()), false), "{v} should read as true");
        }
        for v in ["0", "False", "no", "OFF"] {
            assert!(!parse_boolean_flag(Some(v.into()), true), "{v} should read as false");
        }
    }

    #[test]
    fn unset_or_junk_falls_back() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(Some("maybe".into()), false));
    }
}
