use std::sync::OnceLock;

use regex::Regex;

// Each platform is one row: adding a platform is adding a row.
// Rows are tried in order and the first match wins, so patterns are
// anchored on their own domain to never overlap.

/// An 11 characters YouTube video ID
macro_rules! yt_id {
    () => {
        r"([A-Za-z0-9_-]{11})"
    };
}
/// A purely numeric ID
macro_rules! num_id {
    () => {
        r"(\d+)"
    };
}
/// A URL slug
macro_rules! slug {
    () => {
        r"([A-Za-z0-9_-]+)"
    };
}
/// Start of a domain name: either the start of the input, a scheme, or a subdomain
macro_rules! domain_start {
    () => {
        r"(?:^|[/.@])"
    };
}

/// youtube.com/watch?v=ID, youtube.com/shorts/ID, youtu.be/ID, ...
const YOUTUBE_URL: &str = concat!(
    domain_start!(),
    r"(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|shorts/|embed/|live/|v/)|youtu\.be/)",
    yt_id!()
);
/// A bare YouTube ID, e.g. "dQw4w9WgXcQ"
const YOUTUBE_BARE: &str = concat!("^", yt_id!(), "$");
/// x.com/user/status/ID or twitter.com/user/status/ID
const X_URL: &str = concat!(domain_start!(), r"(?:twitter|x)\.com/[^/]+/status(?:es)?/", num_id!());
/// tiktok.com/@user/video/ID
const TIKTOK_URL: &str = concat!(domain_start!(), r"tiktok\.com/(?:@[^/]+/video|v|embed(?:/v2)?)/", num_id!());
/// instagram.com/p/SLUG, instagram.com/reel/SLUG, ...
const INSTAGRAM_URL: &str = concat!(domain_start!(), r"instagram\.com/(?:[^/]+/)?(?:p|reels?|tv)/", slug!());
/// facebook.com/user/videos/ID, facebook.com/watch?v=ID, facebook.com/reel/ID
const FACEBOOK_URL: &str = concat!(
    domain_start!(),
    r"facebook\.com/(?:.*/videos/(?:[^/?#]+/)?|watch/?\?(?:[^#]*&)?v=|reel/)",
    num_id!()
);
/// npo.nl/start/serie/.../EPISODE[/afspelen]: the last path segment before the player suffix
const NPO_URL: &str = concat!(
    domain_start!(),
    r"(?:npo|npostart)\.nl/(?:[^?#]*?/)?",
    slug!(),
    r"(?:/afspelen)?/?(?:[?#].*)?$"
);

/// One supported platform URL shape
#[derive(Debug)]
pub struct PlatformPattern {
    /// Prefix of the stable ID, e.g. `yt` in `yt_dQw4w9WgXcQ`
    pub tag: &'static str,
    pub regex: Regex,
    /// Capture group holding the platform's media ID
    pub id_group: usize,
    /// How to rebuild a fetchable URL when the input is a bare ID
    pub url_template: Option<&'static str>,
}

const TABLE: [(&str, &str, usize, Option<&str>); 7] = [
    ("yt", YOUTUBE_URL, 1, None),
    ("yt", YOUTUBE_BARE, 1, Some("https://www.youtube.com/watch?v={id}")),
    ("x", X_URL, 1, None),
    ("tk", TIKTOK_URL, 1, None),
    ("ig", INSTAGRAM_URL, 1, None),
    ("fb", FACEBOOK_URL, 1, None),
    ("npo", NPO_URL, 1, None),
];

static PLATFORMS: OnceLock<Vec<PlatformPattern>> = OnceLock::new();

pub fn platform_patterns() -> &'static [PlatformPattern] {
    PLATFORMS.get_or_init(|| {
        TABLE
            .iter()
            .map(|&(tag, pattern, id_group, url_template)| PlatformPattern {
                tag,
                regex: Regex::new(pattern).expect("platform patterns are valid"),
                id_group,
                url_template,
            })
            .collect()
    })
}
