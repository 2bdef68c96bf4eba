//! Common test utilities.

pub mod requests;
pub mod server;

#[allow(unused_imports)]
pub use requests::*;
#[allow(unused_imports)]
pub use server::*;
