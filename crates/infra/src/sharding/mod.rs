pub mod policy;

pub use policy::{ModuloShardingPolicy, SingleShardPolicy};
