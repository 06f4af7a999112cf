pub mod authenticate;
pub mod evaluate;
pub mod find;
pub mod form;
pub mod utils;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
