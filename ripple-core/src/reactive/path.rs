//! Expression paths.
//!
//! A watch expression like `"user.profile.name"` is split on dots and
//! resolved one segment at a time. The first segment is looked up on the
//! host; the rest walk through object members (or array indices). Every
//! read goes through the normal reactive accessors, so each segment becomes
//! a dependency of the evaluating watcher.

use super::watcher::Host;
use crate::error::Result;
use crate::observer::Value;

/// Split `path` into segments.
///
/// Returns `None` when the path contains anything besides word characters,
/// `.` and `$`: such expressions are not simple property paths.
pub(crate) fn parse_path(path: &str) -> Option<Vec<String>> {
    let valid = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'));
    if !valid {
        return None;
    }
    Some(path.split('.').map(str::to_string).collect())
}

/// Resolve parsed `segments` against `host`.
///
/// Stops with `Undefined` as soon as an intermediate value is null or
/// undefined.
pub(crate) fn resolve_path(host: &dyn Host, segments: &[String]) -> Result<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(Value::Undefined);
    };

    let mut value = host.lookup(first)?;
    for segment in rest {
        if value.is_nullish() {
            return Ok(Value::Undefined);
        }
        value = value.member(segment);
    }
    Ok(value)
}
