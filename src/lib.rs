pub mod api;
pub mod assemble;
pub mod error;
pub mod executor;
pub mod finder;
pub mod include;
pub mod plan;
pub mod schema;
