pub mod api;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod safety;
pub mod state;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
