//! Browser Fingerprint Spoofing
//!
//! Generates desktop browser header profiles so that page fetches and the
//! rendered browser look like an ordinary visitor. Embed hosts routinely
//! serve a stripped page (or nothing) to clients that do not look like a
//! desktop browser.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT,
};

/// User agent sent with manifest proxy requests. Kept deliberately short:
/// CDNs that sign manifest URLs tend to reject anything that varies from
/// the agent the player itself used.
pub const PROXY_USER_AGENT: &str = "Mozilla/5.0";

/// Chrome releases as `(major, full)` pairs.
const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("120", "120.0.6099.130"),
    ("122", "122.0.6261.112"),
    ("124", "124.0.6367.207"),
    ("126", "126.0.6478.127"),
    ("128", "128.0.6613.120"),
];

/// Browser profile with realistic fingerprint
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_mobile: String,
    pub sec_ch_ua_platform: String,
    pub sec_fetch_dest: String,
    pub sec_fetch_mode: String,
    pub sec_fetch_site: String,
    pub sec_fetch_user: String,
}

/// Desktop platforms. Mobile profiles are never generated: several hosts
/// serve a different player (without an inline manifest) to phones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Windows,
    Linux,
}

impl Platform {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        // Realistic distribution: Windows 65%, macOS 20%, Linux 15%
        let roll: f32 = rng.gen();
        if roll < 0.65 {
            Platform::Windows
        } else if roll < 0.85 {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    fn os_string(self) -> &'static str {
        match self {
            Platform::MacOS => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::Linux => "X11; Linux x86_64",
        }
    }

    fn sec_ch_platform(self) -> &'static str {
        match self {
            Platform::MacOS => "\"macOS\"",
            Platform::Windows => "\"Windows\"",
            Platform::Linux => "\"Linux\"",
        }
    }
}

/// Generate a desktop Chrome profile on a random platform.
#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    chrome_profile_for(Platform::random())
}

/// Generate a desktop Chrome profile for a specific platform.
#[must_use]
pub fn chrome_profile_for(platform: Platform) -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let (major, full) = CHROME_VERSIONS
        .choose(&mut rng)
        .copied()
        .unwrap_or(CHROME_VERSIONS[0]);

    let user_agent = format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{full} Safari/537.36",
        platform.os_string(),
    );

    let brands = [
        format!("\"Google Chrome\";v=\"{major}\""),
        format!("\"Chromium\";v=\"{major}\""),
        "\"Not_A Brand\";v=\"24\"".to_string(),
    ];

    BrowserProfile {
        user_agent,
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8".to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        sec_ch_ua: brands.join(", "),
        sec_ch_ua_mobile: "?0".to_string(),
        sec_ch_ua_platform: platform.sec_ch_platform().to_string(),
        sec_fetch_dest: "document".to_string(),
        sec_fetch_mode: "navigate".to_string(),
        sec_fetch_site: "none".to_string(),
        sec_fetch_user: "?1".to_string(),
    }
}

/// Generate random Accept-Language header
fn random_accept_language() -> String {
    let mut rng = rand::thread_rng();
    let languages = [
        "en-US,en;q=0.9",
        "en-GB,en;q=0.9",
        "es-ES,es;q=0.9,en;q=0.8",
        "en-US,en;q=0.9,es;q=0.8",
        "en-US,en;q=0.9,pt;q=0.8",
    ];
    languages
        .choose(&mut rng)
        .copied()
        .unwrap_or("en-US,en;q=0.9")
        .to_string()
}

impl BrowserProfile {
    /// Convert profile to reqwest `HeaderMap`.
    ///
    /// Values that are not valid header text are skipped rather than
    /// failing the whole request.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        insert(&mut headers, USER_AGENT, &self.user_agent);
        insert(&mut headers, ACCEPT, &self.accept);
        insert(&mut headers, ACCEPT_LANGUAGE, &self.accept_language);
        insert(&mut headers, ACCEPT_ENCODING, &self.accept_encoding);

        if !self.sec_ch_ua.is_empty() {
            insert(&mut headers, HeaderName::from_static("sec-ch-ua"), &self.sec_ch_ua);
            insert(
                &mut headers,
                HeaderName::from_static("sec-ch-ua-mobile"),
                &self.sec_ch_ua_mobile,
            );
            insert(
                &mut headers,
                HeaderName::from_static("sec-ch-ua-platform"),
                &self.sec_ch_ua_platform,
            );
        }

        insert(&mut headers, HeaderName::from_static("sec-fetch-dest"), &self.sec_fetch_dest);
        insert(&mut headers, HeaderName::from_static("sec-fetch-mode"), &self.sec_fetch_mode);
        insert(&mut headers, HeaderName::from_static("sec-fetch-site"), &self.sec_fetch_site);
        insert(&mut headers, HeaderName::from_static("sec-fetch-user"), &self.sec_fetch_user);

        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
