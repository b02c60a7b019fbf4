pub mod claude;
pub mod completions;
pub mod responses;
pub mod schema;

#[cfg(test)]
#[path = "conversion_tests.rs"]
mod tests;
