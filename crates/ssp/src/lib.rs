pub mod api;
pub mod common;
pub mod controllers;
pub mod operands;
pub mod util;

#[cfg(test)]
pub mod fixtures;
