//! User-agent and referrer classification
//!
//! Turns the raw `User-Agent` and `Referer` headers of a redirect into the
//! dimensions stored with each click. Parsing is done with woothee; referrers are
//! canonicalised with the `url` crate.

use url::Url;
use woothee::parser::Parser;

use crate::analytics::error::AnalyticsResult;
use crate::analytics::models::{Platform, OTHER};

const UNKNOWN: &str = "UNKNOWN";

/// Dimensions derived from one redirect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub platform: Platform,
    pub os: String,
    pub referrer: String,
    pub is_bot: bool,
}

impl Classification {
    /// Bots and fully unrecognised agents are not stored
    pub fn is_recordable(&self) -> bool {
        !(self.is_bot || (self.platform == Platform::Other && self.os == OTHER))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    degrade_invalid_referrer: bool,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record unparseable referrers as "Other" instead of failing
    pub fn with_degraded_referrers(mut self, degrade: bool) -> Self {
        self.degrade_invalid_referrer = degrade;
        self
    }

    pub fn classify(&self, user_agent: &str, referer: &str) -> AnalyticsResult<Classification> {
        let parsed = Parser::new().parse(user_agent).unwrap_or_default();

        let category = parsed.category.to_string();
        let is_bot = category == "crawler";
        let os = match parsed.os.to_string() {
            os if os.is_empty() || os == UNKNOWN => OTHER.to_string(),
            os => os,
        };
        let platform = platform_of(&category, &os, user_agent);

        let referrer = match normalize_referrer(referer) {
            Ok(referrer) => referrer,
            Err(_) if self.degrade_invalid_referrer => OTHER.to_string(),
            Err(err) => return Err(err.into()),
        };

        Ok(Classification {
            platform,
            os,
            referrer,
            is_bot,
        })
    }
}

/// Mobile, then Desktop, then Tablet; anything else is Other
fn platform_of(category: &str, os: &str, user_agent: &str) -> Platform {
    let handheld = matches!(category, "smartphone" | "mobilephone");
    let tablet = handheld
        && (os == "iPad"
            || user_agent.contains("Tablet")
            || (os == "Android" && !user_agent.contains("Mobile")));

    if handheld && !tablet {
        Platform::Mobile
    } else if category == "pc" {
        Platform::Desktop
    } else if tablet {
        Platform::Tablet
    } else {
        Platform::Other
    }
}

/// Canonicalise a referrer into `scheme://host/path`.
///
/// Scheme and host are lower-cased, default ports dropped, a leading `www.`
/// removed from the host, and credentials, query string and fragment
/// discarded. An empty referrer, or one without a host (`mailto:`, `data:`),
/// yields `"Other"`. A bare `host/path` is read as http.
pub fn normalize_referrer(raw: &str) -> Result<String, url::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(OTHER.to_string());
    }

    let mut url = match Url::parse(raw) {
        Ok(url) if raw.contains("://") => url,
        Ok(_) if !is_host_and_port(raw) => return Ok(OTHER.to_string()),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{raw}"))?
        }
        Err(err) => return Err(err),
    };

    if url.host_str().map_or(true, str::is_empty) {
        return Ok(OTHER.to_string());
    }

    // both setters only fail for URLs without a host
    let _ = url.set_username("");
    let _ = url.set_password(None);

    if let Some(host) = url.host_str().and_then(|h| h.strip_prefix("www.")) {
        let host = host.to_string();
        url.set_host(Some(&host))?;
    }

    url.set_query(None);
    url.set_fragment(None);

    if url.path().len() > 1 && url.path().ends_with('/') {
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);
    }

    Ok(url.into())
}

/// `localhost:8080/x` parses as a URL with scheme `localhost`
fn is_host_and_port(raw: &str) -> bool {
    raw.split_once(':')
        .is_some_and(|(_, rest)| rest.starts_with(|c: char| c.is_ascii_digit()))
}
