//! Archive-relative path resolution.
//!
//! Member names and references inside a book are relative URLs. They are
//! resolved by joining onto an `epub:/` base, so `.` and `..` segments fold
//! away and can never climb above the archive root. The resulting path is
//! percent-decoded, which makes `my%20pic.png` and `my pic.png` the same member.

use percent_encoding::percent_decode_str;
use url::Url;

use bookdigest_shared::{BookDigestError, Result};

/// Base directory for references resolved from the archive root.
pub const ROOT_DIR: &str = "";

const ARCHIVE_SCHEME: &str = "epub";
const ARCHIVE_BASE: &str = "epub:/";

/// Resolve `href` against the archive directory `base_dir` ("" for the root).
///
/// Fragment and query are dropped. Fails when the reference leaves the
/// archive (`http://...`) or names a directory rather than a member.
pub fn resolve(base_dir: &str, href: &str) -> Result<String> {
    let base = dir_url(base_dir)?;
    let joined = base
        .join(href.trim())
        .map_err(|e| BookDigestError::parse(format!("invalid reference {href:?}: {e}")))?;

    if joined.scheme() != ARCHIVE_SCHEME {
        return Err(BookDigestError::parse(format!(
            "reference {href:?} points outside the archive"
        )));
    }

    let path = percent_decode_str(joined.path().trim_start_matches('/'))
        .decode_utf8_lossy()
        .into_owned();
    if path.is_empty() || path.ends_with('/') {
        return Err(BookDigestError::parse(format!(
            "reference {href:?} does not name a member"
        )));
    }

    Ok(path)
}

/// Directory part of an archive path, "" for a top-level member.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Deepest directory containing `anchor_dir` and the parent of every path.
pub fn common_dir<'a>(anchor_dir: &str, paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut common: Vec<&str> = segments(anchor_dir).collect();
    for path in paths {
        let shared = segments(parent_dir(path))
            .zip(&common)
            .take_while(|(a, b)| a == *b)
            .count();
        common.truncate(shared);
    }
    common.join("/")
}

/// `path` relative to the directory `dir`, which must contain it.
pub fn relative_to<'a>(dir: &str, path: &'a str) -> &'a str {
    if dir.is_empty() {
        return path;
    }
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

fn dir_url(dir: &str) -> Result<Url> {
    let mut url = Url::parse(ARCHIVE_BASE)
        .map_err(|e| BookDigestError::parse(format!("archive base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| BookDigestError::parse("archive base url cannot hold a path"))?
        .pop_if_empty()
        .extend(segments(dir))
        .push("");
    Ok(url)
}

fn segments(dir: &str) -> impl Iterator<Item = &str> {
    dir.split('/').filter(|s| !s.is_empty())
}
