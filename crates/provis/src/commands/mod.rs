pub mod provision;
pub mod rollback;
pub mod validate;
