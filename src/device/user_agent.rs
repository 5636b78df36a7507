//! User-agent string parsing.
//!
//! Best-effort classification of OS, browser and device class. Order
//! matters: mobile agents also advertise desktop tokens ("like Mac OS X",
//! "Linux"), so the more specific platforms are matched first.

use std::sync::LazyLock;

use regex::Regex;

use super::SystemInfo;

static WINDOWS_NT: LazyLock<Regex> = LazyLock::new(|| re(r"Windows NT ([0-9._]+)"));
static IOS: LazyLock<Regex> = LazyLock::new(|| re(r"OS ([0-9_]+)"));
static ANDROID: LazyLock<Regex> = LazyLock::new(|| re(r"Android ([0-9.]+)"));
static MAC_OS_X: LazyLock<Regex> = LazyLock::new(|| re(r"Mac OS X ([0-9_]+)"));
static FIREFOX: LazyLock<Regex> = LazyLock::new(|| re(r"Firefox/([0-9.]+)"));
static SAFARI_VERSION: LazyLock<Regex> = LazyLock::new(|| re(r"Version/([0-9.]+)"));
static EDGE: LazyLock<Regex> = LazyLock::new(|| re(r"Edg/([0-9.]+)"));
static OPERA: LazyLock<Regex> = LazyLock::new(|| re(r"OPR/([0-9.]+)"));
static CHROME: LazyLock<Regex> = LazyLock::new(|| re(r"Chrome/([0-9.]+)"));
static MOBILE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini")
});
static MOBILE_WORD: LazyLock<Regex> = LazyLock::new(|| re(r"\bMobile\b"));

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static user-agent pattern must compile")
}

fn capture(regex: &Regex, haystack: &str) -> Option<String> {
    regex
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Classify `user_agent`; `platform` is passed through untouched.
pub fn parse(user_agent: &str, platform: &str) -> SystemInfo {
    let (os_name, os_version) = detect_os(user_agent);
    let (browser, browser_version) = detect_browser(user_agent);

    SystemInfo {
        platform: platform.to_string(),
        os_name: os_name.to_string(),
        os_version,
        browser: browser.to_string(),
        browser_version,
        device_type: detect_device(user_agent).to_string(),
    }
}

fn detect_os(ua: &str) -> (&'static str, String) {
    if ua.contains("Windows NT") {
        let version = capture(&WINDOWS_NT, ua)
            .map(|v| match v.as_str() {
                "10.0" => "10/11".to_string(),
                "6.3" => "8.1".to_string(),
                "6.2" => "8".to_string(),
                "6.1" => "7".to_string(),
                _ => v,
            })
            .unwrap_or_default();
        ("Windows", version)
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        let name = if ua.contains("iPad") { "iPadOS" } else { "iOS" };
        let version = capture(&IOS, ua).map(|v| v.replace('_', ".")).unwrap_or_default();
        (name, version)
    } else if ua.contains("Android") {
        ("Android", capture(&ANDROID, ua).unwrap_or_default())
    } else if ua.contains("Mac OS X") {
        let version = capture(&MAC_OS_X, ua)
            .map(|v| v.replace('_', "."))
            .unwrap_or_default();
        ("macOS", version)
    } else if ua.contains("Linux") {
        ("Linux", String::new())
    } else {
        ("Unknown", String::new())
    }
}

fn detect_browser(ua: &str) -> (&'static str, String) {
    if ua.contains("Firefox/") {
        ("Firefox", capture(&FIREFOX, ua).unwrap_or_default())
    } else if ua.contains("Safari/") && !ua.contains("Chrome") {
        ("Safari", capture(&SAFARI_VERSION, ua).unwrap_or_default())
    } else if ua.contains("Chrome/") {
        if ua.contains("Edg/") {
            ("Microsoft Edge", capture(&EDGE, ua).unwrap_or_default())
        } else if ua.contains("OPR/") {
            ("Opera", capture(&OPERA, ua).unwrap_or_default())
        } else {
            ("Chrome", capture(&CHROME, ua).unwrap_or_default())
        }
    } else {
        ("Unknown", String::new())
    }
}

fn detect_device(ua: &str) -> &'static str {
    let android = ua.contains("Android");
    let tablet = ua.contains("iPad") || (android && !MOBILE_WORD.is_match(ua));
    if tablet {
        "tablet"
    } else if MOBILE.is_match(ua) {
        "mobile"
    } else {
        "desktop"
    }
}
