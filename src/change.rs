//! Change detection between a freshly fetched record and the persisted one.

/// Returns `true` if there was no previous record, or if it differs from `new`.
///
/// Equality is structural over the decoded record, so key ordering or
/// whitespace in the file on disk never registers as a change.
pub fn has_changed<R: PartialEq>(old: Option<&R>, new: &R) -> bool {
    match old {
        Some(old) => old != new,
        None => true,
    }
}
