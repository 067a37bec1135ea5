use thiserror::Error;

pub type VfsResult<T> = Result<T, VfsError>;

/// Failures of structural operations on a [`MemoryFileSystem`](super::MemoryFileSystem).
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("No such file: {0}")]
    PathNotFound(String),

    #[error("Name already taken: {0}")]
    AlreadyExists(String),

    #[error("Expected a directory: {0}")]
    NotDirectory(String),

    #[error("Identity invalidated: {0}")]
    InvalidFile(String),

    #[error("Bad path: {0}")]
    InvalidPath(String),

    #[error("Name is {0} bytes, limit is 255")]
    FilenameTooLong(usize),

    #[error("{0} cannot be moved below itself")]
    CyclicMove(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidated_identity_message() {
        let err = VfsError::InvalidFile("/gone.rs".to_string());
        assert_eq!(err.to_string(), "Identity invalidated: /gone.rs");
    }

    #[test]
    fn test_cyclic_move_message() {
        let err = VfsError::CyclicMove("/src".to_string());
        assert_eq!(err.to_string(), "/src cannot be moved below itself");
    }
}
