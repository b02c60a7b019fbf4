pub mod claude;
pub mod completions;
pub mod responses;
