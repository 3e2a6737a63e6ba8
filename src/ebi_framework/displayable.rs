use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

/// A state that can be stored in search structures and shown in log messages.
pub trait Displayable: Hash + Clone + Eq + Display + Debug + Send + Sync {}
