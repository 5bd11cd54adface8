use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("UnknownEntity {}", name))]
    UnknownEntity { name: String },

    #[snafu(display("DuplicateAlias {} on {}", alias, source_type))]
    DuplicateAlias { source_type: String, alias: String },

    #[snafu(display("InvalidAssociation {} -> {}: {}", source_type, target_type, message))]
    InvalidAssociation {
        source_type: String,
        target_type: String,
        message: String,
    },

    #[snafu(display("UnknownAssociation {} -> {}", source_type, target))]
    UnknownAssociation { source_type: String, target: String },

    #[snafu(display("AssociationNotFound {} -> {}", parent, target))]
    AssociationNotFound { parent: String, target: String },

    #[snafu(display("UnknownAttribute {}.{}", entity, attribute))]
    UnknownAttribute { entity: String, attribute: String },

    #[snafu(display("UnknownOrderPath {}", path))]
    UnknownOrderPath { path: String },

    #[snafu(display("QueryExecution {}", message))]
    QueryExecution { message: String },
}

impl Error {
    /// True for errors raised while validating a request, before any
    /// query is issued.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Error::QueryExecution { .. })
    }
}
