//! Configuration error output
// (c) 2024 Ross Younger

use figment::error::{Kind, OneOf};
use thiserror::Error;

/// A newtype wrapper implementing a friendlier `Display` for configuration errors
#[derive(Debug, Error, PartialEq)]
pub struct ConfigFileError(#[source] Box<figment::Error>);

impl From<figment::Error> for ConfigFileError {
    fn from(e: figment::Error) -> Self {
        Self(Box::new(e))
    }
}

impl std::ops::Deref for ConfigFileError {
    type Target = figment::Error;

    /// Returns a reference to the inner error
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConfigFileError {
    fn fmt_kind(kind: &Kind, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match kind {
            Kind::InvalidType(v, exp) => write!(f, "invalid type: found {v}, expected {exp}"),
            Kind::UnknownVariant(v, exp) => {
                write!(f, "unknown variant: found {v}, expected {}", OneOf(exp))
            }
            _ => std::fmt::Display::fmt(&kind, f),
        }
    }
}

impl std::fmt::Display for ConfigFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let e = self;
        Self::fmt_kind(&e.kind, f)?;

        if let (Some(profile), Some(md)) = (&e.profile, &e.metadata)
            && !e.path.is_empty()
        {
            let key = md.interpolate(profile, &e.path);
            write!(f, " for {key}")?;
        }

        if let Some(md) = &e.metadata {
            if let Some(source) = &md.source {
                write!(f, " at {source}")?;
            } else {
                write!(f, " in {}", md.name)?;
            }
        }
        Ok(())
    }
}
