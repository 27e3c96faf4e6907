#[macro_use]
pub(crate) mod common;
pub(crate) mod executor;
pub(crate) mod scheduler;
pub(crate) mod server;

#[cfg(test)]
mod tests;
