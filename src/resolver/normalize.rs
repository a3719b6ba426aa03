//! Dashboard link normalization.
//!
//! Relative links are joined onto the inbound request's origin, and the
//! default `/status` page is stripped so that proxied sub-resources resolve
//! against the dashboard root.

use crate::error::ProxyError;
use crate::resolver::RequestContext;

/// Default dashboard page reported by cluster managers.
pub const STATUS_SUFFIX: &str = "/status";

/// Join URL path pieces with exactly one `/` between them.
///
/// A leading `/` on the first piece and a trailing `/` on the last piece are
/// kept; empty pieces are skipped.
pub fn url_path_join(pieces: &[&str]) -> String {
    let leading = pieces.first().is_some_and(|p| p.starts_with('/'));
    let trailing = pieces.last().is_some_and(|p| p.ends_with('/'));

    let mut joined = pieces
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if leading {
        joined.insert(0, '/');
    }
    if trailing {
        joined.push('/');
    }
    if joined == "//" {
        joined.truncate(1);
    }
    joined
}

/// Whether the link already names a scheme the proxy understands.
pub fn is_absolute_link(link: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        link.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Make a dashboard link absolute and strip the default `/status` page.
pub fn normalize_dashboard_link(link: &str, ctx: &RequestContext) -> Result<String, ProxyError> {
    let mut link = if is_absolute_link(link) {
        link.to_string()
    } else {
        let host = ctx.host.as_deref().ok_or(ProxyError::MissingHost)?;
        let origin = format!("{}://{}", ctx.scheme, host);
        url_path_join(&[&origin, link])
    };

    if link.ends_with(STATUS_SUFFIX) {
        link.truncate(link.len() - STATUS_SUFFIX.len());
    }
    Ok(link)
}
