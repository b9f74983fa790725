use crate::config::GateConfig;
use std::borrow::Cow;

/// Special paths the gates redirect to or exempt
#[derive(Debug, Clone)]
pub struct GatePaths {
    pub wait: String,
    pub home: String,
    pub install: String,
    pub asset_prefixes: Vec<String>,
}

impl GatePaths {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            wait: config.wait_path.clone(),
            home: config.home_path.clone(),
            install: config.install_path.clone(),
            asset_prefixes: config.asset_prefixes.clone(),
        }
    }

    pub fn is_asset(&self, path: &str) -> bool {
        self.asset_prefixes
            .iter()
            .any(|prefix| starts_with_segments(path, prefix))
    }
}

impl Default for GatePaths {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

/// Percent-decode each segment of a request path. An encoded `/` stays
/// encoded so it cannot split a segment, and a segment that does not decode
/// to UTF-8 is kept as sent.
pub fn decode_path(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }

    let segments: Vec<Cow<'_, str>> = path
        .split('/')
        .map(|segment| match urlencoding::decode(segment) {
            Ok(decoded) if !decoded.contains('/') => decoded,
            _ => Cow::Borrowed(segment),
        })
        .collect();

    Cow::Owned(segments.join("/"))
}

/// Whole-path comparison, ASCII case-insensitive
#[inline]
pub fn path_equals(path: &str, other: &str) -> bool {
    path.eq_ignore_ascii_case(other)
}

/// True when `prefix` matches whole leading segments of `path`:
/// "/mnt" matches "/mnt" and "/mnt/step" but not "/mntx".
pub fn starts_with_segments(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }

    let (p, rest) = match (path.get(..prefix.len()), path.get(prefix.len()..)) {
        (Some(p), Some(rest)) => (p, rest),
        _ => return false,
    };

    p.eq_ignore_ascii_case(prefix) && (rest.is_empty() || rest.starts_with('/'))
}
