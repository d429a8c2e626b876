use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

const ISSUE: &str = r"-?\d+(?:\.\d+)?";

regex!(YEAR_REGEX, r"\((\d{4})\)");
// Scanner and release tags: "(digital)", "[Zone-Empire]", "{HD}".
regex!(TRAILING_GROUP_REGEX, r"\s*(?:\([^()]*\)|\[[^\[\]]*\]|\{[^{}]*\})\s*$");
regex!(WHITESPACE_REGEX, r"\s+");
// "Series - 001 - Title"
regex!(
    SERIES_ISSUE_TITLE_REGEX,
    format!(r"^(?P<series>.+?)\s+-\s+#?(?P<issue>{ISSUE})\s+-\s+(?P<title>.+)$").as_str()
);
// "Series v02 003", "Series Vol. 2 #3"
regex!(
    SERIES_VOLUME_ISSUE_REGEX,
    format!(r"(?i)^(?P<series>.+?)\s+(?:v|vol\.?\s*)(?P<volume>\d+)\s+(?:-\s+)?#?(?P<issue>{ISSUE})$").as_str()
);
// "Series v02"
regex!(SERIES_VOLUME_REGEX, r"(?i)^(?P<series>.+?)\s+(?:v|vol\.?\s*)(?P<volume>\d+)$");
// "Series #12.5", "Series - #12"
regex!(SERIES_HASH_ISSUE_REGEX, format!(r"^(?P<series>.+?)\s*(?:-\s*)?#(?P<issue>{ISSUE})$").as_str());
// "Series 001", "Series - 001"
regex!(SERIES_ISSUE_REGEX, format!(r"^(?P<series>.+?)\s+(?:-\s+)?(?P<issue>{ISSUE})$").as_str());
// PDF dates: "D:20100314120000+01'00'"
regex!(PDF_DATE_REGEX, r"^(?:D:)?(\d{4})(\d{2})?(\d{2})?");
