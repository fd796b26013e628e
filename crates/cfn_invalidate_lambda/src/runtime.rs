pub use cfn_invalidate_core::{contract, identity, polling};
