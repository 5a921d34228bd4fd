use crate::LutKind;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy reported to callers of [`crate::merge`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Format,
    Referential,
    Capacity,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse keyframe table: {message}")]
    TableParse { message: String },

    #[error("failed to parse model: {message}")]
    ModelParse { message: String },

    #[error("{lut} index {index} out of range for table '{table}' ({len} entries)")]
    IndexOutOfRange {
        lut: LutKind,
        index: u16,
        len: usize,
        table: String,
    },

    #[error("model '{model}' references table '{table}', which is not part of the merge")]
    UnknownTable { model: String, table: String },

    #[error("master table '{name}' is not referenced by any input model")]
    UnknownMasterTable { name: String },

    #[error("{lut} index stream holds {supplied} entries but the model consumes {expected}")]
    IndexStreamMismatch {
        lut: LutKind,
        expected: usize,
        supplied: usize,
    },

    #[error("{required} distinct {lut} values do not fit the master table capacity of {capacity}")]
    Capacity {
        lut: LutKind,
        required: usize,
        capacity: usize,
    },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TableParse { .. } | Self::ModelParse { .. } => ErrorKind::Format,
            Self::IndexOutOfRange { .. }
            | Self::UnknownTable { .. }
            | Self::UnknownMasterTable { .. }
            | Self::IndexStreamMismatch { .. } => ErrorKind::Referential,
            Self::Capacity { .. } => ErrorKind::Capacity,
            Self::Io { .. } => ErrorKind::Io,
            Self::InFile { source, .. } => source.kind(),
        }
    }

    /// Attaches the path of the file being processed. Already-located errors are left as is.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io { .. } | Self::InFile { .. } => self,
            other => Self::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
