use reqwest::Url;

/// Parse "true"/"false"/"1"/"0" from an owned String.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    parse_bool_str(&s)
}

pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads a boolean environment flag; unset or unparseable values yield `default`.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(default)
}

/// Returns the trimmed value of an environment variable, or `None` when unset or blank.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host.trim().to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "[::1]"
                || normalized == "::1"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

/// Cuts `text` to at most `max_chars` characters and appends `marker` when anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{marker}", &text[..byte_index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_helpers() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_flag("YES".to_string()), Some(true));
        assert_eq!(parse_bool_flag("off".to_string()), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_is_local_endpoint_url_normalizes_case_and_space() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:8000/v1/messages "));
        assert!(is_local_endpoint_url("https://127.0.0.1/v1/messages"));
        assert!(!is_local_endpoint_url(
            "https://evil-localhost.com/v1/messages"
        ));
        assert!(!is_local_endpoint_url(
            "https://api.anthropic.com/v1/messages"
        ));
    }

    #[test]
    fn test_truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 10, "…"), "héllo");
        assert_eq!(truncate_chars("héllo", 2, "[cut]"), "hé[cut]");
        assert_eq!(truncate_chars("abc", 3, "[cut]"), "abc");
    }

    #[test]
    fn test_env_helpers_read_process_environment() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("AGENTDESK_TEST_FLAG", "on");
        std::env::set_var("AGENTDESK_TEST_TEXT", "   ");
        assert!(env_flag("AGENTDESK_TEST_FLAG", false));
        assert!(env_flag("AGENTDESK_TEST_MISSING", true));
        assert_eq!(env_non_empty("AGENTDESK_TEST_TEXT"), None);
        std::env::remove_var("AGENTDESK_TEST_FLAG");
        std::env::remove_var("AGENTDESK_TEST_TEXT");
    }
}
