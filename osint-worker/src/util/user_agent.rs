//! User agent rotation for outbound scraping requests.

use rand::prelude::*;

/// Agent used when neither the request nor the configured pool names one.
pub const DEFAULT_USER_AGENT: &str = "OSINT-Worker/1.0";

/// Choose the agent for one request.
///
/// An explicit agent wins. Otherwise a random entry of `pool` is used, then
/// [`DEFAULT_USER_AGENT`].
pub fn pick_user_agent(explicit: Option<&str>, pool: Option<&[String]>) -> String {
    if let Some(agent) = explicit.filter(|a| !a.is_empty()) {
        return agent.to_string();
    }

    let mut rng = thread_rng();
    pool.and_then(|agents| agents.choose(&mut rng))
        .cloned()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
}

/// Build standard headers for page requests.
pub fn build_headers(user_agent: &str) -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_string(), user_agent.to_string()),
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Connection".to_string(), "keep-alive".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_user_agent_default() {
        assert_eq!(pick_user_agent(None, None), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_pick_user_agent_explicit_wins() {
        let pool = vec!["PoolAgent/1.0".to_string()];
        assert_eq!(pick_user_agent(Some("Mine/2.0"), Some(&pool)), "Mine/2.0");
    }

    #[test]
    fn test_pick_user_agent_from_pool() {
        let pool = vec!["PoolAgent/1.0".to_string()];
        assert_eq!(pick_user_agent(Some(""), Some(&pool)), "PoolAgent/1.0");
    }

    #[test]
    fn test_pick_user_agent_empty_pool() {
        let empty: Vec<String> = vec![];
        assert_eq!(pick_user_agent(None, Some(&empty)), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_build_headers() {
        let headers = build_headers("TestAgent/1.0");
        assert_eq!(headers.len(), 4);
        assert!(headers.iter().any(|(k, v)| k == "User-Agent" && v == "TestAgent/1.0"));
    }
}
