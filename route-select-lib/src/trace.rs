#![allow(unused)]
pub(crate) use tracing::{debug, error, info, trace, warn};
