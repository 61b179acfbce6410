//! Maps a locked path to the kind of server resource it protects.

use crate::model::ResourceCategory;

/// Path segments checked after the file name, in priority order.
const SEGMENTS: &[&str] = &["clients/", "clientEntity/", "meta/", "replica/"];

/// Classifies a lock path. Total: absent or unrecognised paths are `UnknownPath`.
///
/// The file name wins over directory segments, so
/// `/p4/1/root/server.locks/meta/db.rev` is a table file, not a meta lock.
pub fn classify_path(path: Option<&str>) -> ResourceCategory {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return ResourceCategory::UnknownPath;
    };

    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name.starts_with("db.") || file_name == "rdb.lbr" || file_name.starts_with("storage")
    {
        return ResourceCategory::DbTable(file_name.to_string());
    }

    match SEGMENTS.iter().find(|s| path_has_segment(path, s)) {
        Some(&"meta/") => ResourceCategory::MetaTable,
        Some(&"replica/") => ResourceCategory::Replica,
        Some(_) => ResourceCategory::ClientEntity,
        None => ResourceCategory::UnknownPath,
    }
}

/// True if `segment` (with trailing `/`) starts at a directory boundary in `path`.
fn path_has_segment(path: &str, segment: &str) -> bool {
    path.match_indices(segment)
        .any(|(idx, _)| idx == 0 || path.as_bytes()[idx - 1] == b'/')
}
