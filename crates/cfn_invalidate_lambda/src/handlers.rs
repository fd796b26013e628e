pub mod callback;
pub mod invalidation;
pub mod lifecycle;
