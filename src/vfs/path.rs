use super::error::{VfsError, VfsResult};

const MAX_NAME_BYTES: usize = 255;

/// Split an absolute path into validated names, root excluded.
pub fn path_components(path: &str) -> VfsResult<Vec<String>> {
    if !path.starts_with('/') {
        return Err(VfsError::InvalidPath(format!("{:?} is not absolute", path)));
    }
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| validate_name(segment).map(|_| segment.to_string()))
        .collect()
}

pub fn validate_name(name: &str) -> VfsResult<()> {
    match name {
        "" | "." | ".." => Err(VfsError::InvalidPath(format!("reserved name {:?}", name))),
        _ if name.contains(['/', '\0']) => {
            Err(VfsError::InvalidPath(format!("separator or NUL in {:?}", name)))
        }
        _ if name.len() > MAX_NAME_BYTES => Err(VfsError::FilenameTooLong(name.len())),
        _ => Ok(()),
    }
}

pub fn join(parent: &str, name: &str) -> String {
    match parent {
        "/" => format!("/{}", name),
        _ => format!("{}/{}", parent, name),
    }
}
