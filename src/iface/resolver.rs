use crate::error::{IfshError, Result};
use crate::platform::ControlChannel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Unique(String),
    NotFound,
    Ambiguous(Vec<String>),
}

/// Case-insensitive match of `name` against the live interface names.
pub fn resolve_names(names: &[String], name: &str) -> Resolution {
    let mut matches: Vec<String> = names
        .iter()
        .filter(|candidate| candidate.eq_ignore_ascii_case(name))
        .cloned()
        .collect();
    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Unique(matches.remove(0)),
        _ => Resolution::Ambiguous(matches),
    }
}

pub fn resolve(channel: &dyn ControlChannel, name: &str) -> Result<Resolution> {
    let names = channel.interface_names()?;
    Ok(resolve_names(&names, name))
}

/// The live interface `name` refers to, or `NotFound`.
pub fn resolve_unique(channel: &dyn ControlChannel, name: &str) -> Result<String> {
    match resolve(channel, name)? {
        Resolution::Unique(found) => Ok(found),
        Resolution::NotFound | Resolution::Ambiguous(_) => Err(IfshError::NotFound(name.to_string())),
    }
}
