mod session;

pub use crate::session::*;
