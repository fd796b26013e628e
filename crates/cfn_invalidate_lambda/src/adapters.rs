pub mod callback;
pub mod clock;
pub mod distribution;
