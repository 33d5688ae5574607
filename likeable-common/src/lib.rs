pub mod capability;
pub mod model;
pub mod resolver;
pub mod snowflake;
pub mod store;
