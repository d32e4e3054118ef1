use tracing::{debug, warn};

const KNOWN_TLDS: [&str; 7] = ["com", "net", "org", "fun", "app", "dev", "xyz"];

const INVITE_PREFIXES: [&str; 3] = ["discord.gg/", "discord.com/invite/", "discord.com/"];

/// Normalizes a user-supplied link for the link labelled `label`.
///
/// Returns the empty string when the link cannot be made into a valid URL.
pub fn normalize_link(label: &str, link: &str) -> String {
    let link = link.trim();
    if let Some(rest) = link.strip_prefix("http://") {
        return format!("https://{}", rest);
    }
    if link.starts_with("https://") {
        debug!(link, "keeping link");
        return link.to_string();
    }
    debug!(link, "possibly invalid link");

    if link.is_empty() || link.contains(char::is_whitespace) {
        warn!(link, "removing invalid link");
        return String::new();
    }

    if label == "Support" {
        let bare = link.strip_prefix("www.").unwrap_or(link);
        let code = INVITE_PREFIXES
            .iter()
            .find_map(|prefix| bare.strip_prefix(prefix))
            .unwrap_or(bare);
        let fixed = format!("https://discord.gg/{}", code);
        debug!(link = %fixed, "fixed support link");
        return fixed;
    }

    let host = link.split('/').next().unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    let tld = labels.last().copied().unwrap_or_default();
    if labels.len() > 1 && (tld.len() == 2 || KNOWN_TLDS.contains(&tld)) {
        debug!(link, "prefixing bare domain with https://");
        return format!("https://{}", link);
    }

    warn!(link, "removing invalid link");
    String::new()
}

/// `website` -> `Website`.
pub(crate) fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
