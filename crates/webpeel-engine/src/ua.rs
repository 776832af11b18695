//! User-Agent rotation and the matching client-hint headers.
//!
//! A weighted Chrome 132-136 rotation (Windows ~55% / macOS ~35% /
//! Linux ~10%), deriving `Sec-CH-UA*` from the chosen major version rather
//! than hardcoding it.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    fn ua_platform_token(self) -> &'static str {
        match self {
            Platform::Windows => "\"Windows\"",
            Platform::MacOs => "\"macOS\"",
            Platform::Linux => "\"Linux\"",
        }
    }

    fn ua_os_segment(self) -> &'static str {
        match self {
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::MacOs => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Linux => "X11; Linux x86_64",
        }
    }
}

pub struct UaProfile {
    pub user_agent: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_platform: &'static str,
    pub sec_ch_ua_mobile: &'static str,
}

/// "Not A Brand" placeholder version: v8 for Chrome 132-133, v99 for
/// 134-135, v24 for 136 and up — the three variants Chromium has actually
/// shipped across those milestones.
fn not_a_brand_version(chrome_major: u32) -> &'static str {
    match chrome_major {
        132 | 133 => "8",
        134 | 135 => "99",
        _ => "24",
    }
}

/// Weighted (platform, Chrome major version) pairs: Windows ~55%, macOS
/// ~35%, Linux ~10%, spread evenly across the 132-136 milestone range.
const WEIGHTED_CHOICES: &[(Platform, u32, u32)] = &[
    (Platform::Windows, 132, 11),
    (Platform::Windows, 133, 11),
    (Platform::Windows, 134, 11),
    (Platform::Windows, 135, 11),
    (Platform::Windows, 136, 11),
    (Platform::MacOs, 132, 7),
    (Platform::MacOs, 133, 7),
    (Platform::MacOs, 134, 7),
    (Platform::MacOs, 135, 7),
    (Platform::MacOs, 136, 7),
    (Platform::Linux, 132, 2),
    (Platform::Linux, 133, 2),
    (Platform::Linux, 134, 2),
    (Platform::Linux, 135, 2),
    (Platform::Linux, 136, 2),
];

fn build_profile(platform: Platform, chrome_major: u32) -> UaProfile {
    let user_agent = format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{chrome_major}.0.0.0 Safari/537.36",
        platform.ua_os_segment()
    );
    let nab = not_a_brand_version(chrome_major);
    let sec_ch_ua = format!(
        "\"Chromium\";v=\"{chrome_major}\", \"Not.A/Brand\";v=\"{nab}\", \"Google Chrome\";v=\"{chrome_major}\""
    );
    UaProfile {
        user_agent,
        sec_ch_ua,
        sec_ch_ua_platform: platform.ua_platform_token(),
        sec_ch_ua_mobile: "?0",
    }
}

/// Pick a weighted-random profile from the rotation table.
pub fn random_profile() -> UaProfile {
    let total: u32 = WEIGHTED_CHOICES.iter().map(|(_, _, w)| w).sum();
    let mut roll = rand::thread_rng().gen_range(0..total);
    for &(platform, major, weight) in WEIGHTED_CHOICES {
        if roll < weight {
            return build_profile(platform, major);
        }
        roll -= weight;
    }
    build_profile(Platform::Windows, 136)
}

/// `Sec-Fetch-*` headers for a top-level document navigation request.
pub fn sec_fetch_headers() -> &'static [(&'static str, &'static str)] {
    &[
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_profile_returns_nonempty_ua() {
        for _ in 0..50 {
            let p = random_profile();
            assert!(p.user_agent.contains("Chrome/13"));
            assert!(!p.sec_ch_ua.is_empty());
        }
    }

    #[test]
    fn not_a_brand_version_matches_milestone_ranges() {
        assert_eq!(not_a_brand_version(132), "8");
        assert_eq!(not_a_brand_version(133), "8");
        assert_eq!(not_a_brand_version(134), "99");
        assert_eq!(not_a_brand_version(135), "99");
        assert_eq!(not_a_brand_version(136), "24");
        assert_eq!(not_a_brand_version(140), "24");
    }
}
